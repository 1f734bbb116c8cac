//! `list` — the E2B API offers no listing for this client, so this only points
//! at the dashboard.

use crate::config::Config;
use crate::output;

pub fn run(config: &Config) -> anyhow::Result<()> {
    println!("📋 Listing E2B Sandboxes...\n");
    super::ensure_valid(config)?;
    println!("{}", output::list_unsupported());
    Ok(())
}
