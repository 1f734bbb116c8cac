//! Configuration: built-in defaults, an optional TOML file, then environment
//! variables, later sources winning.
//!
//! The file lives at `<config dir>/mcp-sandbox/config.toml` unless
//! `--config` points elsewhere. Every key is optional:
//!
//! ```toml
//! e2b_api_key = "e2b_..."
//! template = "base"
//! timeout_ms = 300000
//! github_token = "ghp_..."
//! ```

use crate::sandbox::e2b::{E2B_API_BASE, E2B_DOMAIN};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_TEMPLATE: &str = "base";
pub const DEFAULT_SANDBOX_TIMEOUT_MS: u64 = 300_000;
pub const DASHBOARD_URL: &str = "https://e2b.dev/dashboard";

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("E2B_API_KEY is required")]
    MissingApiKey,

    #[error("invalid sandbox timeout `{0}`: expected a number of milliseconds")]
    InvalidTimeout(String),

    #[error("failed to read config file {}: {error}", .path.display())]
    Read {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("failed to parse config file {}: {error}", .path.display())]
    Parse {
        path: PathBuf,
        error: toml::de::Error,
    },
}

impl ConfigError {
    /// Follow-up lines printed under the error.
    pub fn hints(&self) -> Vec<String> {
        match self {
            ConfigError::MissingApiKey => vec![
                format!("Get your API key from {DASHBOARD_URL}"),
                "Set it in the config file or the E2B_API_KEY environment variable".to_string(),
            ],
            ConfigError::InvalidTimeout(_) => {
                vec!["E2B_SANDBOX_TIMEOUT takes milliseconds, e.g. 300000".to_string()]
            }
            ConfigError::Read { .. } | ConfigError::Parse { .. } => Vec::new(),
        }
    }
}

/// Non-fatal configuration problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    MissingGithubToken,
    PartialBrowserbase,
}

impl ConfigWarning {
    pub fn lines(&self) -> &'static [&'static str] {
        match self {
            ConfigWarning::MissingGithubToken => &[
                "GITHUB_TOKEN not set",
                "GitHub Copilot CLI and GitHub MCP tools will not work",
            ],
            ConfigWarning::PartialBrowserbase => &[
                "Browserbase needs both BROWSERBASE_API_KEY and BROWSERBASE_PROJECT_ID",
                "Browserbase MCP server will not be configured",
            ],
        }
    }
}

/// On-disk shape; everything optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub e2b_api_key: Option<String>,
    pub api_url: Option<String>,
    pub domain: Option<String>,
    pub template: Option<String>,
    pub timeout_ms: Option<u64>,
    pub github_token: Option<String>,
    pub jina_api_key: Option<String>,
    pub notion_api_key: Option<String>,
    pub browserbase_api_key: Option<String>,
    pub browserbase_project_id: Option<String>,
}

#[derive(Clone)]
pub struct Config {
    pub e2b_api_key: Option<String>,
    pub api_url: String,
    pub domain: String,
    pub template: String,
    pub timeout_ms: u64,
    pub github_token: Option<String>,
    pub jina_api_key: Option<String>,
    pub notion_api_key: Option<String>,
    pub browserbase_api_key: Option<String>,
    pub browserbase_project_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            e2b_api_key: None,
            api_url: E2B_API_BASE.to_string(),
            domain: E2B_DOMAIN.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
            timeout_ms: DEFAULT_SANDBOX_TIMEOUT_MS,
            github_token: None,
            jina_api_key: None,
            notion_api_key: None,
            browserbase_api_key: None,
            browserbase_project_id: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(v: &Option<String>) -> &'static str {
            if v.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }

        f.debug_struct("Config")
            .field("e2b_api_key", &redact(&self.e2b_api_key))
            .field("api_url", &self.api_url)
            .field("domain", &self.domain)
            .field("template", &self.template)
            .field("timeout_ms", &self.timeout_ms)
            .field("github_token", &redact(&self.github_token))
            .field("jina_api_key", &redact(&self.jina_api_key))
            .field("notion_api_key", &redact(&self.notion_api_key))
            .field("browserbase_api_key", &redact(&self.browserbase_api_key))
            .field("browserbase_project_id", &self.browserbase_project_id)
            .finish()
    }
}

/// Default location of the config file, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "e2b", "mcp-sandbox")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Read and parse a config file.
pub fn read_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
        path: path.to_path_buf(),
        error,
    })?;
    toml::from_str(&raw).map_err(|error| ConfigError::Parse {
        path: path.to_path_buf(),
        error,
    })
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

impl Config {
    /// Load from the file at `explicit_path` (or the default location, which
    /// may be absent) and the process environment.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match explicit_path {
            Some(path) => Some(read_config_file(&expand_path(path))?),
            None => match default_config_path() {
                Some(path) if path.is_file() => Some(read_config_file(&path)?),
                _ => None,
            },
        };

        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge defaults, `file`, and the variables returned by `env`.
    pub fn resolve(
        file: Option<FileConfig>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let pick = |key: &str, from_file: Option<String>| {
            env(key).or(from_file.filter(|v| !v.trim().is_empty()))
        };

        let mut config = Config::default();

        config.e2b_api_key = pick("E2B_API_KEY", file.e2b_api_key);
        config.github_token = pick("GITHUB_TOKEN", file.github_token);
        config.jina_api_key = pick("JINA_API_KEY", file.jina_api_key);
        config.notion_api_key = pick("NOTION_API_KEY", file.notion_api_key);
        config.browserbase_api_key = pick("BROWSERBASE_API_KEY", file.browserbase_api_key);
        config.browserbase_project_id =
            pick("BROWSERBASE_PROJECT_ID", file.browserbase_project_id);

        if let Some(url) = pick("E2B_API_URL", file.api_url) {
            config.api_url = url;
        }
        if let Some(domain) = pick("E2B_DOMAIN", file.domain) {
            config.domain = domain;
        }
        if let Some(template) = pick("E2B_SANDBOX_TEMPLATE", file.template) {
            config.template = template;
        }

        if let Some(raw) = env("E2B_SANDBOX_TIMEOUT") {
            config.timeout_ms = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
        } else if let Some(timeout_ms) = file.timeout_ms {
            config.timeout_ms = timeout_ms;
        }

        if config.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("0".to_string()));
        }

        Ok(config)
    }

    /// Hard failures are errors; everything else comes back as warnings.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        if self.e2b_api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }

        let mut warnings = Vec::new();
        if self.github_token.is_none() {
            warnings.push(ConfigWarning::MissingGithubToken);
        }
        if self.browserbase_api_key.is_some() != self.browserbase_project_id.is_some() {
            warnings.push(ConfigWarning::PartialBrowserbase);
        }
        Ok(warnings)
    }
}
