//! Azure Key Vault store (REST, `Get Secret`)

use crate::store::SecretStore;
use crate::value::SecretValue;
use async_trait::async_trait;
use cloud_proxy_core::azure::AzureTokenProvider;
use cloud_proxy_core::{Error, HttpStatusError, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use url::Url;

const API_VERSION: &str = "7.4";

/// Secret store backed by an Azure Key Vault
pub struct KeyVaultStore {
    vault_url: String,
    base: Url,
    tokens: Arc<AzureTokenProvider>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}

impl KeyVaultStore {
    /// Create a store for `vault_url` (e.g. `https://myvault.vault.azure.net`)
    pub fn new(vault_url: impl Into<String>, tokens: Arc<AzureTokenProvider>) -> Result<Self> {
        let vault_url = vault_url.into().trim_end_matches('/').to_string();
        let base = Url::parse(&vault_url)
            .map_err(|e| Error::configuration(format!("invalid Key Vault URL '{vault_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::configuration(format!(
                "invalid Key Vault URL '{vault_url}': not a base URL"
            )));
        }

        Ok(Self {
            vault_url,
            base,
            tokens,
            http: reqwest::Client::new(),
        })
    }

    /// Vault base URL
    pub fn vault_url(&self) -> &str {
        &self.vault_url
    }

    /// `{vault}/secrets/{name}` with the name as a single escaped segment
    fn secret_url(&self, name: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::configuration(format!("invalid Key Vault URL '{}'", self.vault_url)))?
            .pop_if_empty()
            .push("secrets")
            .push(name);
        Ok(url)
    }
}

#[async_trait]
impl SecretStore for KeyVaultStore {
    async fn fetch(&self, name: &str) -> Result<SecretValue> {
        let token = self
            .tokens
            .token()
            .await
            .map_err(|e| Error::secret_fetch(name, e))?;

        let url = self.secret_url(name)?;
        debug!(secret = %name, vault = %self.vault_url, "Key Vault Get Secret");

        let response = self
            .http
            .get(url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| Error::secret_fetch(name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::secret_fetch(
                name,
                HttpStatusError::new(status.as_u16(), body),
            ));
        }

        let bundle: SecretBundle = response
            .json()
            .await
            .map_err(|e| Error::secret_fetch(name, e))?;

        Ok(SecretValue::Text(bundle.value))
    }

    fn name(&self) -> &'static str {
        "azure-key-vault"
    }
}
