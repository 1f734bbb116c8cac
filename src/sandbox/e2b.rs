//! E2B sandbox provider — HTTP client for the E2B REST API.
//!
//! Commands are requested in streaming mode: the API answers with
//! newline-delimited JSON events which are forwarded to the caller's
//! [`OutputSink`] as they arrive. Deployments that do not stream answer with
//! a single JSON object instead; both shapes are accepted.

use super::{CommandOutput, CreateSandboxRequest, OutputSink, RunOptions, SandboxClient};
use crate::config::Config;
use anyhow::Context as _;
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Base URL for the E2B REST API.
pub const E2B_API_BASE: &str = "https://api.e2b.dev";

/// Domain sandbox hosts are served under unless the API reports another.
pub const E2B_DOMAIN: &str = "e2b.app";

/// Working directory every command starts in.
const WORKDIR: &str = "/home/user";

/// User commands run as when a command does not set one.
const DEFAULT_USER: &str = "user";

/// Extra wall-clock allowance on top of the command timeout for the HTTP round trip.
const COMMAND_GRACE: Duration = Duration::from_secs(5);

/// Timeout for the non-command API calls (create, kill).
const API_TIMEOUT: Duration = Duration::from_secs(120);

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// One event of a streamed command response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommandEvent {
    Stdout {
        line: String,
    },
    Stderr {
        line: String,
    },
    Exit {
        #[serde(rename = "exitCode", alias = "exit_code")]
        exit_code: i64,
    },
    /// Keep-alives and event types this client does not use.
    #[serde(other)]
    Other,
}

/// Parse one line of a streamed command response. Blank lines yield `None`.
pub fn parse_command_event(line: &str) -> anyhow::Result<Option<CommandEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| anyhow::anyhow!("Malformed command event: {e}\nLine: {line}"))
}

/// Accumulates a command's output while forwarding each line to the sink.
struct OutputCollector<'a> {
    sink: Option<&'a dyn OutputSink>,
    stdout: String,
    stderr: String,
    exit_code: Option<i64>,
}

impl<'a> OutputCollector<'a> {
    fn new(sink: Option<&'a dyn OutputSink>) -> Self {
        Self {
            sink,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
        }
    }

    fn stdout_line(&mut self, line: &str) {
        if let Some(sink) = self.sink {
            sink.stdout_line(line);
        }
        self.stdout.push_str(line);
        self.stdout.push('\n');
    }

    fn stderr_line(&mut self, line: &str) {
        if let Some(sink) = self.sink {
            sink.stderr_line(line);
        }
        self.stderr.push_str(line);
        self.stderr.push('\n');
    }

    fn apply(&mut self, event: CommandEvent) {
        match event {
            CommandEvent::Stdout { line } => self.stdout_line(&line),
            CommandEvent::Stderr { line } => self.stderr_line(&line),
            CommandEvent::Exit { exit_code } => self.exit_code = Some(exit_code),
            CommandEvent::Other => {}
        }
    }

    fn finish(self) -> anyhow::Result<CommandOutput> {
        let exit_code = self
            .exit_code
            .ok_or_else(|| anyhow::anyhow!("E2B command stream ended without an exit code"))?;
        Ok(CommandOutput {
            stdout: self.stdout,
            stderr: self.stderr,
            exit_code,
        })
    }
}

#[derive(Deserialize)]
struct CreateSandboxResponse {
    #[serde(rename = "sandboxID", alias = "sandbox_id")]
    sandbox_id: String,
    #[serde(default)]
    domain: Option<String>,
}

#[derive(Deserialize)]
struct CommandResponse {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(rename = "exitCode", alias = "exit_code")]
    exit_code: i64,
}

/// HTTP client for one E2B sandbox at a time.
pub struct E2bSandboxClient {
    api_key: String,
    api_url: String,
    domain: Arc<Mutex<String>>,
    sandbox_id: Arc<Mutex<Option<String>>>,
    http: reqwest::Client,
}

impl E2bSandboxClient {
    pub fn new(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        domain: impl Into<String>,
    ) -> anyhow::Result<Self> {
        // No client-wide timeout: installs may legitimately run for minutes,
        // so each request carries its own.
        let http = reqwest::Client::builder()
            .user_agent(concat!("mcp-sandbox/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            api_key: api_key.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            domain: Arc::new(Mutex::new(domain.into())),
            sandbox_id: Arc::new(Mutex::new(None)),
            http,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = config
            .e2b_api_key
            .clone()
            .ok_or(crate::config::ConfigError::MissingApiKey)?;
        Self::new(api_key, &config.api_url, &config.domain)
    }

    fn live_id(&self) -> anyhow::Result<String> {
        self.sandbox_id
            .lock()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No active sandbox"))
    }

    async fn execute_command(
        &self,
        url: &str,
        body: &serde_json::Value,
        sink: Option<&dyn OutputSink>,
    ) -> anyhow::Result<CommandOutput> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("E2B run_command request failed: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            anyhow::bail!("E2B API returned {status}: {body_text}");
        }

        let streamed = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with(NDJSON_CONTENT_TYPE));

        let mut collector = OutputCollector::new(sink);

        if streamed {
            let mut stream = resp.bytes_stream();
            let mut pending: Vec<u8> = Vec::new();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| anyhow::anyhow!("E2B command stream failed: {e}"))?;
                pending.extend_from_slice(&chunk);

                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    if let Some(event) = parse_command_event(&String::from_utf8_lossy(&line))? {
                        collector.apply(event);
                    }
                }
            }

            if let Some(event) = parse_command_event(&String::from_utf8_lossy(&pending))? {
                collector.apply(event);
            }
        } else {
            let body_text = resp
                .text()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read E2B response: {e}"))?;
            let parsed: CommandResponse = serde_json::from_str(&body_text).map_err(|e| {
                anyhow::anyhow!("Failed to parse E2B response: {e}\nBody: {body_text}")
            })?;

            for line in parsed.stdout.lines() {
                collector.stdout_line(line);
            }
            for line in parsed.stderr.lines() {
                collector.stderr_line(line);
            }
            collector.exit_code = Some(parsed.exit_code);
        }

        collector.finish()
    }
}

#[async_trait]
impl SandboxClient for E2bSandboxClient {
    async fn create_sandbox(&self, request: &CreateSandboxRequest) -> anyhow::Result<String> {
        anyhow::ensure!(!self.api_key.is_empty(), "E2B_API_KEY is not set");

        let url = format!("{}/v0/sandboxes", self.api_url);
        let body = serde_json::json!({
            "templateID": request.template,
            "timeout": request.timeout_ms.div_ceil(1000),
        });

        tracing::debug!(template = %request.template, timeout_ms = request.timeout_ms, "creating E2B sandbox");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(API_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("E2B create sandbox request failed: {e}"))?;

        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable>".to_string());

        anyhow::ensure!(
            status.is_success(),
            "E2B API returned {status}: {body_text}"
        );

        let parsed: CreateSandboxResponse = serde_json::from_str(&body_text)
            .map_err(|e| anyhow::anyhow!("Failed to parse E2B response: {e}\nBody: {body_text}"))?;

        anyhow::ensure!(
            !parsed.sandbox_id.is_empty(),
            "E2B returned no sandbox_id. Response: {body_text}"
        );

        if let Some(domain) = parsed.domain.filter(|d| !d.is_empty()) {
            *self.domain.lock() = domain;
        }

        tracing::info!(sandbox_id = %parsed.sandbox_id, "E2B sandbox created");
        *self.sandbox_id.lock() = Some(parsed.sandbox_id.clone());
        Ok(parsed.sandbox_id)
    }

    async fn kill_sandbox(&self) -> anyhow::Result<String> {
        let sandbox_id = match self.sandbox_id.lock().clone() {
            Some(id) => id,
            None => return Ok("No active sandbox to kill.".to_string()),
        };

        let url = format!("{}/v0/sandboxes/{sandbox_id}", self.api_url);

        let resp = self
            .http
            .delete(&url)
            .bearer_auth(&self.api_key)
            .timeout(API_TIMEOUT)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("E2B kill request failed: {e}"))?;

        let status = resp.status();

        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            *self.sandbox_id.lock() = None;
            tracing::info!(%sandbox_id, "E2B sandbox terminated");
            Ok(format!("Sandbox {sandbox_id} terminated."))
        } else {
            let body_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            anyhow::bail!("E2B API returned {status}: {body_text}")
        }
    }

    async fn run_command(
        &self,
        command: &str,
        options: &RunOptions,
    ) -> anyhow::Result<CommandOutput> {
        let sandbox_id = self.live_id()?;
        let url = format!("{}/v0/sandboxes/{sandbox_id}/commands", self.api_url);

        let body = serde_json::json!({
            "cmd": command,
            "workdir": WORKDIR,
            "user": options.user.as_deref().unwrap_or(DEFAULT_USER),
            "envs": options.envs,
            "timeout": options.timeout_ms.div_ceil(1000),
            "stream": true,
        });

        tracing::debug!(%sandbox_id, command, timeout_ms = options.timeout_ms, "running command");

        let budget = Duration::from_millis(options.timeout_ms) + COMMAND_GRACE;
        match tokio::time::timeout(
            budget,
            self.execute_command(&url, &body, options.sink.as_deref()),
        )
        .await
        {
            Err(_elapsed) => Err(anyhow::anyhow!(
                "Command timed out after {}ms",
                options.timeout_ms
            )),
            Ok(result) => result,
        }
    }

    fn host(&self, port: u16) -> anyhow::Result<String> {
        let sandbox_id = self.live_id()?;
        Ok(format!("{port}-{sandbox_id}.{}", self.domain.lock()))
    }

    fn current_id(&self) -> Option<String> {
        self.sandbox_id.lock().clone()
    }
}
