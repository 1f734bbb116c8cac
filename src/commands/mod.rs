//! CLI subcommands.
//!
//! Each command prints its own header, validates the configuration it needs,
//! and returns `anyhow::Result`. A [`ConfigError`] inside that error is
//! printed with its hints by `main`.

pub mod create;
pub mod list;

pub use create::CreateArgs;

use crate::config::{Config, ConfigError};
use crate::output;

/// Validate `config`, printing any warnings to stderr.
pub fn ensure_valid(config: &Config) -> Result<(), ConfigError> {
    for warning in config.validate()? {
        eprintln!("{}", output::warning_lines(warning.lines()));
    }
    Ok(())
}
