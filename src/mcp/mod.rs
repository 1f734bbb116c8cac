//! MCP server configuration and the in-sandbox MCP gateway.
//!
//! Credentials are passed through to the gateway untouched; this module only
//! decides which servers to enable and how to launch the gateway with them.

use crate::sandbox::{RunOptions, SandboxClient};
use crate::Config;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Port the gateway listens on inside the sandbox.
pub const GATEWAY_PORT: u16 = 50005;

/// Gateway URL as seen from inside the sandbox.
pub const INTERNAL_GATEWAY_URL: &str = "http://localhost:50005/mcp";

const GATEWAY_TOKEN_ENV: &str = "GATEWAY_ACCESS_TOKEN";
const GATEWAY_START_TIMEOUT_MS: u64 = 60_000;

#[derive(Clone, Serialize)]
pub struct GithubServer {
    pub token: String,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JinaServer {
    pub api_key: String,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotionServer {
    pub internal_integration_token: String,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserbaseServer {
    pub api_key: String,
    pub project_id: String,
}

/// MCP servers to enable, serialized as the gateway's `--config` object.
#[derive(Clone, Default, Serialize)]
pub struct McpServers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubServer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jina: Option<JinaServer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notion: Option<NotionServer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browserbase: Option<BrowserbaseServer>,
}

impl McpServers {
    pub fn from_config(config: &Config) -> Self {
        let browserbase = match (&config.browserbase_api_key, &config.browserbase_project_id) {
            (Some(api_key), Some(project_id)) => Some(BrowserbaseServer {
                api_key: api_key.clone(),
                project_id: project_id.clone(),
            }),
            _ => None,
        };

        Self {
            github: config.github_token.clone().map(|token| GithubServer { token }),
            jina: config.jina_api_key.clone().map(|api_key| JinaServer { api_key }),
            notion: config
                .notion_api_key
                .clone()
                .map(|internal_integration_token| NotionServer {
                    internal_integration_token,
                }),
            browserbase,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.configured_names().is_empty()
    }

    /// Display names of the enabled servers.
    pub fn configured_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.github.is_some() {
            names.push("GitHub");
        }
        if self.jina.is_some() {
            names.push("Jina AI");
        }
        if self.notion.is_some() {
            names.push("Notion");
        }
        if self.browserbase.is_some() {
            names.push("Browserbase");
        }
        names
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string(self).map_err(|e| anyhow::anyhow!("Failed to serialize MCP config: {e}"))
    }
}

/// Quote `value` for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Shell command that launches the gateway with `servers`.
pub fn gateway_command(servers: &McpServers) -> anyhow::Result<String> {
    Ok(format!("mcp-gateway --config {}", shell_quote(&servers.to_json()?)))
}

/// Short SHA-256 fingerprint of a token, safe to print.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)[..8].to_string()
}

/// A running gateway and the credentials to reach it.
pub struct McpGateway {
    url: String,
    token: String,
}

impl McpGateway {
    /// Launch the gateway inside the sandbox. Returns `None` when no servers
    /// are configured.
    pub async fn start<C>(client: &C, servers: &McpServers) -> anyhow::Result<Option<Self>>
    where
        C: SandboxClient + ?Sized,
    {
        if servers.is_empty() {
            tracing::info!("no MCP servers configured; gateway not started");
            return Ok(None);
        }

        let token = uuid::Uuid::new_v4().to_string();
        let command = gateway_command(servers)?;
        let options = RunOptions::with_timeout(GATEWAY_START_TIMEOUT_MS)
            .user("root")
            .env(GATEWAY_TOKEN_ENV, token.clone());

        let output = client.run_command(&command, &options).await?;
        anyhow::ensure!(
            output.success(),
            "Failed to start MCP gateway (exit {}): {}",
            output.exit_code,
            output.stderr.trim()
        );

        let url = format!("https://{}/mcp", client.host(GATEWAY_PORT)?);
        tracing::info!(%url, servers = ?servers.configured_names(), "MCP gateway started");

        Ok(Some(Self { url, token }))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn fingerprint(&self) -> String {
        token_fingerprint(&self.token)
    }
}
