//! Secrets proxy factory
//!
//! [`SecretsProxy::connect`] dispatches on the credential variant, builds the
//! matching remote store and wraps it in a [`SecretCache`].

use crate::audit::AuditLog;
use crate::aws::SecretsManagerStore;
use crate::azure::KeyVaultStore;
use crate::cache::{CacheStats, SecretCache};
use crate::store::SecretStore;
use crate::value::SecretValue;
use cloud_proxy_core::azure::{AzureTokenProvider, KEY_VAULT_SCOPE};
use cloud_proxy_core::{Credentials, Error, Result, SecretCacheConfig};
use std::sync::Arc;
use tracing::info;

/// Cached access to one remote secret store
pub struct SecretsProxy {
    cache: SecretCache,
    store_name: &'static str,
}

impl SecretsProxy {
    /// Build a proxy for the given credentials
    pub async fn connect(credentials: &Credentials, config: &SecretCacheConfig) -> Result<Self> {
        credentials.validate()?;
        config.validate()?;

        let store: Arc<dyn SecretStore> = match credentials {
            Credentials::AwsDefault { region, endpoint } => Arc::new(
                SecretsManagerStore::connect(region.as_deref(), endpoint.as_deref(), None).await?,
            ),
            Credentials::AwsStatic {
                region,
                endpoint,
                access_key_id,
                secret_access_key,
            } => Arc::new(
                SecretsManagerStore::connect(
                    region.as_deref(),
                    endpoint.as_deref(),
                    Some((access_key_id.as_str(), secret_access_key)),
                )
                .await?,
            ),
            Credentials::AzureDefault { account_url } => Arc::new(KeyVaultStore::new(
                account_url.as_str(),
                Arc::new(AzureTokenProvider::from_default_environment(
                    KEY_VAULT_SCOPE,
                )),
            )?),
            Credentials::AzureClientSecret {
                account_url,
                tenant_id,
                client_id,
                client_secret,
            } => Arc::new(KeyVaultStore::new(
                account_url.as_str(),
                Arc::new(AzureTokenProvider::client_secret(
                    tenant_id.as_str(),
                    client_id.as_str(),
                    client_secret.clone(),
                    KEY_VAULT_SCOPE,
                )),
            )?),
            Credentials::AzureBearerToken { account_url, token } => Arc::new(KeyVaultStore::new(
                account_url.as_str(),
                Arc::new(AzureTokenProvider::static_token(token.clone())),
            )?),
            Credentials::AzureConnectionString { .. } | Credentials::AzureSasToken { .. } => {
                return Err(Error::configuration(format!(
                    "{} credentials cannot access Azure Key Vault",
                    credentials.kind()
                )))
            }
        };

        info!(
            store = store.name(),
            max_entries = config.max_entries,
            ttl_secs = config.ttl_secs,
            "Secrets proxy ready"
        );
        Self::with_store(store, config)
    }

    /// Build a proxy over an existing store
    pub fn with_store(store: Arc<dyn SecretStore>, config: &SecretCacheConfig) -> Result<Self> {
        let store_name = store.name();
        Ok(Self {
            cache: SecretCache::from_config(store, config)?,
            store_name,
        })
    }

    /// Return a text secret
    ///
    /// Binary secrets are returned when they are valid UTF-8.
    pub async fn get_secret(&self, name: &str) -> Result<String> {
        let value = self.lookup("get_secret", name).await?;
        match &value {
            SecretValue::Text(text) => Ok(text.clone()),
            SecretValue::Binary(bytes) => String::from_utf8(bytes.clone()).map_err(|_| {
                Error::configuration(format!(
                    "secret '{name}' is binary; use get_binary_secret"
                ))
            }),
        }
    }

    /// Return the raw bytes of a secret
    pub async fn get_binary_secret(&self, name: &str) -> Result<Vec<u8>> {
        let value = self.lookup("get_binary_secret", name).await?;
        Ok(value.as_bytes().to_vec())
    }

    async fn lookup(&self, operation: &'static str, name: &str) -> Result<SecretValue> {
        let audit = AuditLog::new(operation, name, self.store_name);
        match self.cache.get(name).await {
            Ok(value) => {
                audit.log();
                Ok(value)
            }
            Err(err) => {
                audit.with_error(&err).log();
                Err(err)
            }
        }
    }

    /// The underlying cache
    pub fn cache(&self) -> &SecretCache {
        &self.cache
    }

    /// Cache statistics
    pub async fn stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Name of the remote store
    pub fn store_name(&self) -> &'static str {
        self.store_name
    }
}
