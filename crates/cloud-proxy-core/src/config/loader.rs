//! Layered configuration loader
//!
//! Precedence (low to high):
//! 1. Built-in defaults
//! 2. Config file (`~/.cloud-proxy/config.yaml` or an explicit path)
//! 3. Environment variables (`CLOUD_PROXY_*` prefix)
//! 4. CLI flags (handled by caller)

use super::types::ProxyConfig;
use crate::error::{Error, Result};
use crate::utils::config_home;
use camino::{Utf8Path, Utf8PathBuf};
use std::env;
use std::fs;
use std::str::FromStr;
use tracing::debug;

const CONFIG_FILE_NAME: &str = "config.yaml";

/// Loads [`ProxyConfig`] from defaults, file and environment
pub struct ConfigLoader {
    /// Directory holding the default config file
    config_dir: Utf8PathBuf,
    /// Explicit file; must exist when set
    explicit_file: Option<Utf8PathBuf>,
}

impl ConfigLoader {
    /// Loader rooted at `~/.cloud-proxy`
    pub fn new() -> Result<Self> {
        Ok(Self::with_dir(config_home()?))
    }

    /// Loader with a custom config directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self {
            config_dir,
            explicit_file: None,
        }
    }

    /// Read this file instead of the default one
    pub fn with_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    /// File the loader reads, whether or not it exists
    pub fn config_path(&self) -> Utf8PathBuf {
        self.explicit_file
            .clone()
            .unwrap_or_else(|| self.config_dir.join(CONFIG_FILE_NAME))
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Load and validate configuration
    pub fn load(&self) -> Result<ProxyConfig> {
        let path = self.config_path();
        let config = if path.exists() {
            debug!(path = %path, "Loading configuration file");
            Self::load_yaml_file(&path)?
        } else if self.explicit_file.is_some() {
            return Err(Error::configuration(format!(
                "config file not found: {path}"
            )));
        } else {
            debug!(path = %path, "No configuration file, using defaults");
            ProxyConfig::default()
        };

        let config = Self::apply_env_overrides(config)?;
        config.validate()?;
        Ok(config)
    }

    fn load_yaml_file(path: &Utf8Path) -> Result<ProxyConfig> {
        let content = fs::read_to_string(path)?;
        serde_yaml_ng::from_str(&content)
            .map_err(|e| Error::configuration(format!("failed to parse {path}: {e}")))
    }

    fn apply_env_overrides(mut config: ProxyConfig) -> Result<ProxyConfig> {
        if let Some(val) = env_number("CLOUD_PROXY_SECRETS_MAX_ENTRIES")? {
            config.secrets.max_entries = val;
        }
        if let Some(val) = env_number("CLOUD_PROXY_SECRETS_TTL_SECS")? {
            config.secrets.ttl_secs = val;
        }
        if let Some(val) = env_number("CLOUD_PROXY_COPY_THRESHOLD")? {
            config.copy.large_object_threshold = val;
        }
        if let Some(val) = env_number("CLOUD_PROXY_COPY_CHUNK_SIZE")? {
            config.copy.base_chunk_size = val;
        }
        if let Some(val) = env_number("CLOUD_PROXY_COPY_CONCURRENCY")? {
            config.copy.concurrency = val;
        }
        Ok(config)
    }
}

fn env_number<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::configuration(format!("{name} must be a valid number"))),
        Err(_) => Ok(None),
    }
}
