//! Sandbox abstraction layer.
//!
//! Defines the [`SandboxClient`] trait and [`CommandOutput`] type that the
//! provider implements, plus the narrower [`CommandExecutor`] capability the
//! installer depends on. Currently one provider exists:
//!
//! - [`e2b::E2bSandboxClient`] — E2B cloud MicroVM (requires `E2B_API_KEY`)
//!
//! [`lease::SandboxLease`] ties a created sandbox to a scope so it is always
//! terminated when the session ends.

pub mod e2b;
pub mod lease;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Timeout applied when a caller does not pick one.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 60_000;

/// Output from a command executed inside a sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Receives command output line by line while the command is still running.
pub trait OutputSink: Send + Sync {
    fn stdout_line(&self, line: &str);
    fn stderr_line(&self, line: &str);
}

/// Per-command execution options.
#[derive(Clone)]
pub struct RunOptions {
    pub timeout_ms: u64,
    pub user: Option<String>,
    pub envs: HashMap<String, String>,
    pub sink: Option<Arc<dyn OutputSink>>,
}

impl RunOptions {
    pub fn with_timeout(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            ..Self::default()
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    pub fn sink(mut self, sink: Option<Arc<dyn OutputSink>>) -> Self {
        self.sink = sink;
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            user: None,
            envs: HashMap::new(),
            sink: None,
        }
    }
}

impl fmt::Debug for RunOptions {
    // env values may carry credentials; only the keys are shown
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("timeout_ms", &self.timeout_ms)
            .field("user", &self.user)
            .field("envs", &self.envs.keys().collect::<Vec<_>>())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

/// Parameters for provisioning a new sandbox.
#[derive(Debug, Clone)]
pub struct CreateSandboxRequest {
    pub template: String,
    pub timeout_ms: u64,
}

impl CreateSandboxRequest {
    pub fn new(template: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            template: template.into(),
            timeout_ms,
        }
    }
}

/// Capability to run one shell command remotely and wait for it.
///
/// Implementations suspend the caller until the command exits or the timeout
/// elapses. Transport failures and timeouts are errors; a nonzero exit code
/// is not.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &str, options: &RunOptions) -> anyhow::Result<CommandOutput>;
}

/// Provider-agnostic sandbox interface.
///
/// A client drives at most one sandbox at a time. Everything except
/// [`create_sandbox`](SandboxClient::create_sandbox) and
/// [`current_id`](SandboxClient::current_id) requires that sandbox to be live.
#[async_trait]
pub trait SandboxClient: Send + Sync {
    /// Provision a new sandbox and make it the live one. Returns the sandbox ID.
    async fn create_sandbox(&self, request: &CreateSandboxRequest) -> anyhow::Result<String>;

    /// Terminate the active sandbox. Returns a status message.
    async fn kill_sandbox(&self) -> anyhow::Result<String>;

    /// Run a shell command inside the sandbox.
    async fn run_command(
        &self,
        command: &str,
        options: &RunOptions,
    ) -> anyhow::Result<CommandOutput>;

    /// Public hostname routing to `port` inside the active sandbox.
    fn host(&self, port: u16) -> anyhow::Result<String>;

    /// The live sandbox ID, if any.
    fn current_id(&self) -> Option<String>;
}

#[async_trait]
impl<T: SandboxClient + ?Sized> CommandExecutor for T {
    async fn run(&self, command: &str, options: &RunOptions) -> anyhow::Result<CommandOutput> {
        self.run_command(command, options).await
    }
}
