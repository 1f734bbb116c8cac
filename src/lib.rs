//! mcp-sandbox: provision an E2B cloud sandbox, start its MCP gateway, and
//! install the GitHub Copilot CLI inside it.
//!
//! The binary in `main.rs` is a thin wrapper around [`commands`]. Everything
//! that talks to the sandbox goes through the [`sandbox::SandboxClient`]
//! trait so the install/verify protocol in [`install`] can be exercised
//! without a live provider.

pub mod commands;
pub mod config;
pub mod install;
pub mod mcp;
pub mod output;
pub mod sandbox;

pub use config::{Config, ConfigError};
pub use install::{install_and_verify, InstallOptions, InstallOutcome, InstallReport};
pub use sandbox::{CommandExecutor, CommandOutput, OutputSink, RunOptions, SandboxClient};
