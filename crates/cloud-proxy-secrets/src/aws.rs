//! AWS Secrets Manager store

use crate::store::SecretStore;
use crate::value::SecretValue;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::config::{Credentials, Region};
use aws_sdk_secretsmanager::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_secretsmanager::Client;
use cloud_proxy_core::{Error, Result, SecureString};
use tracing::debug;

/// Secret store backed by AWS Secrets Manager `GetSecretValue`
pub struct SecretsManagerStore {
    client: Client,
}

impl SecretsManagerStore {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default credential chain, or from a static key
    /// pair when one is given
    pub async fn connect(
        region: Option<&str>,
        endpoint: Option<&str>,
        static_keys: Option<(&str, &SecureString)>,
    ) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let shared_config = loader.load().await;

        let mut builder = aws_sdk_secretsmanager::config::Builder::from(&shared_config);
        if let Some((access_key_id, secret_access_key)) = static_keys {
            builder = builder.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key.expose(),
                None,
                None,
                "cloud-proxy-static",
            ));
        }
        if let Some(endpoint) = endpoint {
            debug!("Using custom Secrets Manager endpoint: {}", endpoint);
            builder = builder.endpoint_url(endpoint);
        }

        let config = builder.build();
        if config.region().is_none() {
            return Err(Error::configuration(
                "no AWS region configured; set 'region' on the connection or AWS_REGION",
            ));
        }

        Ok(Self::new(Client::from_conf(config)))
    }
}

#[async_trait]
impl SecretStore for SecretsManagerStore {
    async fn fetch(&self, name: &str) -> Result<SecretValue> {
        debug!(secret = %name, "GetSecretValue");
        let output = self
            .client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|err| {
                if is_not_found(&err) {
                    debug!(secret = %name, "Secret not found");
                }
                Error::secret_fetch(name, err)
            })?;

        if let Some(text) = output.secret_string() {
            return Ok(SecretValue::Text(text.to_string()));
        }
        if let Some(blob) = output.secret_binary() {
            return Ok(SecretValue::Binary(blob.as_ref().to_vec()));
        }

        Err(Error::secret_fetch(
            name,
            "secret has neither a string nor a binary value",
        ))
    }

    fn name(&self) -> &'static str {
        "aws-secrets-manager"
    }
}

fn is_not_found<E: ProvideErrorMetadata, R>(err: &SdkError<E, R>) -> bool {
    if let SdkError::ServiceError(context) = err {
        return context.err().code() == Some("ResourceNotFoundException");
    }
    false
}
