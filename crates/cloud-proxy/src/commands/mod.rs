//! CLI command implementations

pub mod config;
pub mod secret;
pub mod storage;

use anyhow::{Context, Result};
use camino::Utf8Path;
use cloud_proxy_core::{ConfigLoader, ProxyConfig};

/// Load configuration from `--config` or the default location
pub(crate) fn load_config(path: Option<&Utf8Path>) -> Result<ProxyConfig> {
    let loader = ConfigLoader::new().context("Failed to locate configuration directory")?;
    let loader = match path {
        Some(path) => loader.with_file(path),
        None => loader,
    };
    loader
        .load()
        .with_context(|| format!("Failed to load configuration from {}", loader.config_path()))
}
