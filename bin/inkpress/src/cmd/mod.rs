//! CLI command implementations.

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use inkpress_core::Config;

pub mod build;
pub mod check;
pub mod watch;

/// Load the configuration with environment overrides, resolving source and
/// output paths against the directory holding the file.
pub fn load_config(config_path: &Path) -> Result<Config> {
    let mut config = Config::load_with_env(config_path).wrap_err_with(|| {
        format!("Failed to load configuration from {}", config_path.display())
    })?;

    let root = config_path.parent().unwrap_or_else(|| Path::new(""));
    config.paths = config.paths.rooted_at(root);
    tracing::debug!(?config, "Loaded configuration");

    Ok(config)
}
