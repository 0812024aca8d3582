//! Credential variants for provider proxies
//!
//! Every supported combination of provider and credential kind is one variant
//! of [`Credentials`]. Factories in the secrets and storage crates dispatch on
//! the variant; nothing else inspects credentials.

use crate::error::{Error, Result};
use crate::secure::SecureString;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Cloud provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Azure,
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudProvider::Aws => write!(f, "aws"),
            CloudProvider::Azure => write!(f, "azure"),
        }
    }
}

/// Credentials for one connection, tagged by `kind` in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Credentials {
    /// AWS default credential chain (environment, profile, instance role)
    #[serde(rename_all = "kebab-case")]
    AwsDefault {
        #[serde(default)]
        region: Option<String>,
        /// Custom S3-compatible endpoint; enables path-style addressing
        #[serde(default)]
        endpoint: Option<String>,
    },

    /// AWS static access key pair
    #[serde(rename_all = "kebab-case")]
    AwsStatic {
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
        access_key_id: String,
        secret_access_key: SecureString,
    },

    /// Azure environment credentials or managed identity
    #[serde(rename_all = "kebab-case")]
    AzureDefault { account_url: String },

    /// Azure service principal with a client secret
    #[serde(rename_all = "kebab-case")]
    AzureClientSecret {
        account_url: String,
        tenant_id: String,
        client_id: String,
        client_secret: SecureString,
    },

    /// Azure storage connection string carrying a shared access signature
    #[serde(rename_all = "kebab-case")]
    AzureConnectionString { connection_string: SecureString },

    /// Azure storage account URL with a SAS query string appended
    #[serde(rename_all = "kebab-case")]
    AzureSasToken { url_with_sas: SecureString },

    /// Pre-acquired Azure bearer token
    #[serde(rename_all = "kebab-case")]
    AzureBearerToken {
        account_url: String,
        token: SecureString,
    },
}

impl Credentials {
    /// Provider family this credential belongs to
    pub fn provider(&self) -> CloudProvider {
        match self {
            Credentials::AwsDefault { .. } | Credentials::AwsStatic { .. } => CloudProvider::Aws,
            _ => CloudProvider::Azure,
        }
    }

    /// Short name of the variant, as written in configuration files
    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::AwsDefault { .. } => "aws-default",
            Credentials::AwsStatic { .. } => "aws-static",
            Credentials::AzureDefault { .. } => "azure-default",
            Credentials::AzureClientSecret { .. } => "azure-client-secret",
            Credentials::AzureConnectionString { .. } => "azure-connection-string",
            Credentials::AzureSasToken { .. } => "azure-sas-token",
            Credentials::AzureBearerToken { .. } => "azure-bearer-token",
        }
    }

    /// Check that every field the variant needs is present
    pub fn validate(&self) -> Result<()> {
        let kind = self.kind();
        let require = |field: &str, value: &str| -> Result<()> {
            if value.trim().is_empty() {
                Err(Error::configuration(format!(
                    "{kind} credentials require '{field}'"
                )))
            } else {
                Ok(())
            }
        };

        match self {
            Credentials::AwsDefault { .. } => Ok(()),
            Credentials::AwsStatic {
                access_key_id,
                secret_access_key,
                ..
            } => {
                require("access-key-id", access_key_id)?;
                require("secret-access-key", secret_access_key.expose())
            }
            Credentials::AzureDefault { account_url } => require("account-url", account_url),
            Credentials::AzureClientSecret {
                account_url,
                tenant_id,
                client_id,
                client_secret,
            } => {
                require("account-url", account_url)?;
                require("tenant-id", tenant_id)?;
                require("client-id", client_id)?;
                require("client-secret", client_secret.expose())
            }
            Credentials::AzureConnectionString { connection_string } => {
                require("connection-string", connection_string.expose())
            }
            Credentials::AzureSasToken { url_with_sas } => {
                require("url-with-sas", url_with_sas.expose())
            }
            Credentials::AzureBearerToken { account_url, token } => {
                require("account-url", account_url)?;
                require("token", token.expose())
            }
        }
    }
}

/// Azure account endpoint plus the SAS used to authorize requests against it
#[derive(Clone, PartialEq, Eq)]
pub struct SasEndpoint {
    /// Account (or container) URL without query string
    pub endpoint: Url,
    /// SAS query string without the leading `?`
    pub sas: SecureString,
}

impl fmt::Debug for SasEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SasEndpoint")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl SasEndpoint {
    /// Split an account URL with an appended SAS token
    pub fn from_url_with_sas(url_with_sas: &str) -> Result<Self> {
        let mut url = Url::parse(url_with_sas.trim())
            .map_err(|e| Error::configuration(format!("invalid SAS URL: {e}")))?;
        let sas = url
            .query()
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::configuration("SAS URL has no query string"))?;
        url.set_query(None);
        Ok(Self {
            endpoint: url,
            sas: SecureString::new(sas),
        })
    }

    /// Parse an Azure storage connection string
    ///
    /// Only connection strings carrying a `SharedAccessSignature` are
    /// accepted; account-key signing is not implemented.
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let mut blob_endpoint = None;
        let mut sas = None;
        let mut account_name = None;
        let mut protocol = "https".to_string();
        let mut suffix = "core.windows.net".to_string();
        let mut has_account_key = false;

        for pair in connection_string.split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::configuration("connection string segments must be key=value")
            })?;
            match key.trim() {
                "BlobEndpoint" => blob_endpoint = Some(value.trim().to_string()),
                "SharedAccessSignature" => {
                    sas = Some(value.trim().trim_start_matches('?').to_string())
                }
                "AccountName" => account_name = Some(value.trim().to_string()),
                "DefaultEndpointsProtocol" => protocol = value.trim().to_string(),
                "EndpointSuffix" => suffix = value.trim().to_string(),
                "AccountKey" => has_account_key = true,
                _ => {}
            }
        }

        let sas = match sas {
            Some(sas) if !sas.is_empty() => sas,
            _ if has_account_key => {
                return Err(Error::configuration(
                    "account-key connection strings are not supported; use one with a SharedAccessSignature",
                ))
            }
            _ => {
                return Err(Error::configuration(
                    "connection string has no SharedAccessSignature",
                ))
            }
        };

        let endpoint = match (blob_endpoint, account_name) {
            (Some(endpoint), _) => endpoint,
            (None, Some(account)) => format!("{protocol}://{account}.blob.{suffix}"),
            (None, None) => {
                return Err(Error::configuration(
                    "connection string needs BlobEndpoint or AccountName",
                ))
            }
        };

        let endpoint = Url::parse(&endpoint)
            .map_err(|e| Error::configuration(format!("invalid BlobEndpoint: {e}")))?;

        Ok(Self {
            endpoint,
            sas: SecureString::new(sas),
        })
    }
}
