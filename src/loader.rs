//! Configuration loading
//!
//! Embedded defaults, then an optional `config/local` file, then
//! `DSROUTER_`-prefixed environment variables.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use dsrouter_core::RouterConfig;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Load and validate configuration
pub fn load_config() -> Result<RouterConfig> {
    let config = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/local").required(false))
        // prefix_separator("_") makes DSROUTER_BUDGET__MODE work
        .add_source(
            Environment::with_prefix("DSROUTER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let config: RouterConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
