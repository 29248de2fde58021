//! CLI command: `dsrouter config`

use crate::loader::load_config;
use anyhow::{Context, Result};

/// Print the merged configuration
pub fn run() -> Result<()> {
    let config = load_config()?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}
