//! Configuration types for cloud-proxy
//!
//! Every field carries a serde default so that partial YAML files overlay the
//! built-in defaults.

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// 5 MiB, the smallest part S3 accepts for all but the last part
pub const DEFAULT_BASE_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// 50 MiB
pub const DEFAULT_LARGE_OBJECT_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// Secret cache settings
    #[serde(default)]
    pub secrets: SecretCacheConfig,

    /// Object copy settings
    #[serde(default)]
    pub copy: CopyConfig,

    /// Named connections
    #[serde(default)]
    pub connections: BTreeMap<String, Credentials>,
}

impl ProxyConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.secrets.validate()?;
        self.copy.validate()?;
        for (name, credentials) in &self.connections {
            credentials.validate().map_err(|e| {
                Error::configuration(format!("connection '{name}': {e}"))
            })?;
        }
        Ok(())
    }

    /// Look up a named connection
    pub fn connection(&self, name: &str) -> Result<&Credentials> {
        self.connections
            .get(name)
            .ok_or_else(|| Error::configuration(format!("unknown connection '{name}'")))
    }
}

/// Secret cache bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecretCacheConfig {
    /// Maximum number of cached secrets
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Seconds before a cached secret is refetched
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for SecretCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl SecretCacheConfig {
    /// TTL as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::configuration(
                "secrets.max-entries must be greater than zero",
            ));
        }
        if self.ttl_secs == 0 {
            return Err(Error::configuration(
                "secrets.ttl-secs must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn default_max_entries() -> usize {
    10
}

fn default_ttl_secs() -> u64 {
    3600
}

/// Chunked copy tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CopyConfig {
    /// Objects at or above this size are copied in parts
    #[serde(default = "default_large_object_threshold")]
    pub large_object_threshold: u64,

    /// Smallest part size; grows when the provider part cap requires it
    #[serde(default = "default_base_chunk_size")]
    pub base_chunk_size: u64,

    /// In-flight part limit for copies between different stores
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// In-flight part limit for server-side copies within one store
    #[serde(default = "default_same_provider_concurrency")]
    pub same_provider_concurrency: usize,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            large_object_threshold: default_large_object_threshold(),
            base_chunk_size: default_base_chunk_size(),
            concurrency: default_concurrency(),
            same_provider_concurrency: default_same_provider_concurrency(),
        }
    }
}

impl CopyConfig {
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("copy.large-object-threshold", self.large_object_threshold),
            ("copy.base-chunk-size", self.base_chunk_size),
            ("copy.concurrency", self.concurrency as u64),
            (
                "copy.same-provider-concurrency",
                self.same_provider_concurrency as u64,
            ),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(Error::configuration(format!(
                    "{field} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

fn default_large_object_threshold() -> u64 {
    DEFAULT_LARGE_OBJECT_THRESHOLD
}

fn default_base_chunk_size() -> u64 {
    DEFAULT_BASE_CHUNK_SIZE
}

fn default_concurrency() -> usize {
    5
}

fn default_same_provider_concurrency() -> usize {
    15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.secrets.max_entries, 10);
        assert_eq!(config.secrets.ttl(), Duration::from_secs(3600));
        assert_eq!(config.copy.base_chunk_size, 5_242_880);
        assert_eq!(config.copy.large_object_threshold, 52_428_800);
        assert_eq!(config.copy.concurrency, 5);
        assert_eq!(config.copy.same_provider_concurrency, 15);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
secrets:
  ttl-secs: 60
connections:
  vault:
    kind: azure-default
    account-url: https://myvault.vault.azure.net
"#;
        let config: ProxyConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.secrets.ttl_secs, 60);
        assert_eq!(config.secrets.max_entries, 10);
        assert_eq!(config.copy, CopyConfig::default());
        assert_eq!(config.connection("vault").unwrap().kind(), "azure-default");
        assert!(config.connection("missing").is_err());
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = ProxyConfig::default();
        config.secrets.max_entries = 0;
        assert!(config.validate().unwrap_err().is_configuration());

        let mut config = ProxyConfig::default();
        config.copy.concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("copy.concurrency"));
    }

    #[test]
    fn test_invalid_connection_named_in_error() {
        let yaml = r#"
connections:
  broken:
    kind: azure-bearer-token
    account-url: https://acct.blob.core.windows.net
    token: ""
"#;
        let config: ProxyConfig = serde_yaml_ng::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("connection 'broken'"));
    }
}
