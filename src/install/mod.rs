//! Install a tool inside a remote environment and verify it is usable.
//!
//! A package manager reporting exit code 0 does not mean the binary resolves
//! on the current `PATH`, so installation and verification are separate
//! steps: the install command gets one retry after a fixed delay, then an
//! independent verify command is run unconditionally and its output decides
//! the [`InstallOutcome`].

use crate::sandbox::{CommandExecutor, CommandOutput, OutputSink, RunOptions};
use std::sync::Arc;
use std::time::Duration;

/// Printed by verify commands when the tool cannot be found.
pub const NOT_FOUND_SENTINEL: &str = "NOT_FOUND";

pub const DEFAULT_INSTALL_TIMEOUT_MS: u64 = 180_000;
pub const DEFAULT_VERIFY_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(3_000);

/// Record of one command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallAttempt {
    pub command: String,
    pub timeout_ms: u64,
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl InstallAttempt {
    fn from_output(command: &str, timeout_ms: u64, output: CommandOutput) -> Self {
        Self {
            command: command.to_string(),
            timeout_ms,
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Install exited 0 and the verify probe found the tool.
    Verified,
    /// Install exited 0 but the verify probe could not find the tool.
    InstalledUnverified,
    Failed,
}

/// Outcome plus the raw attempts it was derived from.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub outcome: InstallOutcome,
    pub install: InstallAttempt,
    pub retry: Option<InstallAttempt>,
    pub verify: InstallAttempt,
}

impl InstallReport {
    /// The retry if one happened, otherwise the first attempt.
    pub fn last_install(&self) -> &InstallAttempt {
        self.retry.as_ref().unwrap_or(&self.install)
    }

    pub fn retried(&self) -> bool {
        self.retry.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub install_timeout_ms: u64,
    pub verify_timeout_ms: u64,
    pub retry_delay: Duration,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            install_timeout_ms: DEFAULT_INSTALL_TIMEOUT_MS,
            verify_timeout_ms: DEFAULT_VERIFY_TIMEOUT_MS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Derive the outcome from the last install attempt and the verify probe.
pub fn classify(last_install: &InstallAttempt, verify: &InstallAttempt) -> InstallOutcome {
    if !last_install.succeeded() {
        return InstallOutcome::Failed;
    }

    // whitespace-only output names no path, so it counts as empty
    let probe = verify.stdout.trim();
    if probe.is_empty() || probe.contains(NOT_FOUND_SENTINEL) {
        InstallOutcome::InstalledUnverified
    } else {
        InstallOutcome::Verified
    }
}

/// Run `install_command` (retrying once on a nonzero exit), then
/// `verify_command`, and classify the result.
///
/// Install output is streamed to `sink` line by line; verify output is not.
/// Errors from the executor itself propagate unchanged.
pub async fn install_and_verify<E>(
    executor: &E,
    install_command: &str,
    verify_command: &str,
    options: &InstallOptions,
    sink: Option<Arc<dyn OutputSink>>,
) -> anyhow::Result<InstallReport>
where
    E: CommandExecutor + ?Sized,
{
    anyhow::ensure!(
        !install_command.trim().is_empty(),
        "install command cannot be empty"
    );
    anyhow::ensure!(
        !verify_command.trim().is_empty(),
        "verify command cannot be empty"
    );

    let install_opts = RunOptions::with_timeout(options.install_timeout_ms).sink(sink);

    let first = executor.run(install_command, &install_opts).await?;
    let install = InstallAttempt::from_output(install_command, options.install_timeout_ms, first);

    let retry = if install.succeeded() {
        None
    } else {
        tracing::warn!(
            exit_code = install.exit_code,
            "install failed, retrying once after {}ms",
            options.retry_delay.as_millis()
        );
        tokio::time::sleep(options.retry_delay).await;
        let second = executor.run(install_command, &install_opts).await?;
        Some(InstallAttempt::from_output(
            install_command,
            options.install_timeout_ms,
            second,
        ))
    };

    let verify_opts = RunOptions::with_timeout(options.verify_timeout_ms);
    let probe = executor.run(verify_command, &verify_opts).await?;
    let verify = InstallAttempt::from_output(verify_command, options.verify_timeout_ms, probe);

    let outcome = classify(retry.as_ref().unwrap_or(&install), &verify);
    tracing::info!(?outcome, retried = retry.is_some(), "install finished");

    Ok(InstallReport {
        outcome,
        install,
        retry,
        verify,
    })
}

/// Run a version command and return its trimmed stdout, if any.
pub async fn probe_version<E>(
    executor: &E,
    command: &str,
    timeout_ms: u64,
) -> anyhow::Result<Option<String>>
where
    E: CommandExecutor + ?Sized,
{
    let output = executor
        .run(command, &RunOptions::with_timeout(timeout_ms))
        .await?;
    let version = output.stdout.trim();
    Ok((!version.is_empty()).then(|| version.to_string()))
}

/// Commands describing how to install, find, and version a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub install_command: &'static str,
    pub verify_command: &'static str,
    pub version_command: &'static str,
}

impl ToolSpec {
    pub const fn copilot_cli() -> Self {
        Self {
            name: "GitHub Copilot CLI",
            install_command: "npm install -g @github/copilot",
            verify_command: "command -v copilot || which copilot || echo \"NOT_FOUND\"",
            version_command: "copilot --version || echo \"Not installed\"",
        }
    }

    pub async fn install<E>(
        &self,
        executor: &E,
        options: &InstallOptions,
        sink: Option<Arc<dyn OutputSink>>,
    ) -> anyhow::Result<InstallReport>
    where
        E: CommandExecutor + ?Sized,
    {
        install_and_verify(
            executor,
            self.install_command,
            self.verify_command,
            options,
            sink,
        )
        .await
    }

    pub async fn version<E>(&self, executor: &E, timeout_ms: u64) -> anyhow::Result<Option<String>>
    where
        E: CommandExecutor + ?Sized,
    {
        probe_version(executor, self.version_command, timeout_ms).await
    }
}
