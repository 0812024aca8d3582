//! Storage proxy factory
//!
//! [`StorageProxy::connect`] dispatches on the credential variant and returns
//! one object store plus a copy engine configured from [`CopyConfig`].

use crate::azure::AzureBlobStore;
use crate::engine::ChunkedCopyEngine;
use crate::observer::CopyObserver;
use crate::s3::S3Store;
use crate::store::ObjectStore;
use crate::types::{CopyOutcome, ListOptions, ObjectMetadata, ObjectRef};
use bytes::Bytes;
use cloud_proxy_core::azure::{AzureAccess, AzureTokenProvider, STORAGE_SCOPE};
use cloud_proxy_core::{CopyConfig, Credentials, Error, Result, SasEndpoint};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

/// Object storage access through one connection
pub struct StorageProxy {
    store: Arc<dyn ObjectStore>,
    engine: ChunkedCopyEngine,
}

fn parse_account_url(account_url: &str) -> Result<Url> {
    Url::parse(account_url)
        .map_err(|e| Error::configuration(format!("invalid account URL '{account_url}': {e}")))
}

impl StorageProxy {
    /// Build a proxy for the given credentials
    pub async fn connect(credentials: &Credentials, config: &CopyConfig) -> Result<Self> {
        credentials.validate()?;

        let store: Arc<dyn ObjectStore> = match credentials {
            Credentials::AwsDefault { region, endpoint } => Arc::new(
                S3Store::connect(region.as_deref(), endpoint.as_deref(), None).await?,
            ),
            Credentials::AwsStatic {
                region,
                endpoint,
                access_key_id,
                secret_access_key,
            } => Arc::new(
                S3Store::connect(
                    region.as_deref(),
                    endpoint.as_deref(),
                    Some((access_key_id.as_str(), secret_access_key)),
                )
                .await?,
            ),
            Credentials::AzureDefault { account_url } => Arc::new(AzureBlobStore::new(
                parse_account_url(account_url)?,
                AzureAccess::Bearer(Arc::new(AzureTokenProvider::from_default_environment(
                    STORAGE_SCOPE,
                ))),
            )),
            Credentials::AzureClientSecret {
                account_url,
                tenant_id,
                client_id,
                client_secret,
            } => Arc::new(AzureBlobStore::new(
                parse_account_url(account_url)?,
                AzureAccess::Bearer(Arc::new(AzureTokenProvider::client_secret(
                    tenant_id.as_str(),
                    client_id.as_str(),
                    client_secret.clone(),
                    STORAGE_SCOPE,
                ))),
            )),
            Credentials::AzureBearerToken { account_url, token } => {
                Arc::new(AzureBlobStore::new(
                    parse_account_url(account_url)?,
                    AzureAccess::Bearer(Arc::new(AzureTokenProvider::static_token(token.clone()))),
                ))
            }
            Credentials::AzureConnectionString { connection_string } => {
                let sas = SasEndpoint::from_connection_string(connection_string.expose())?;
                Arc::new(AzureBlobStore::new(sas.endpoint, AzureAccess::Sas(sas.sas)))
            }
            Credentials::AzureSasToken { url_with_sas } => {
                let sas = SasEndpoint::from_url_with_sas(url_with_sas.expose())?;
                Arc::new(AzureBlobStore::new(sas.endpoint, AzureAccess::Sas(sas.sas)))
            }
        };

        info!(
            provider = %store.provider(),
            account = store.account(),
            credentials = credentials.kind(),
            "Storage proxy ready"
        );
        Self::with_store(store, config.clone())
    }

    /// Build a proxy over an existing store
    pub fn with_store(store: Arc<dyn ObjectStore>, config: CopyConfig) -> Result<Self> {
        Ok(Self {
            store,
            engine: ChunkedCopyEngine::new(config)?,
        })
    }

    /// Replace the copy engine's observer
    pub fn with_observer(mut self, observer: Arc<dyn CopyObserver>) -> Self {
        self.engine = self.engine.with_observer(observer);
        self
    }

    /// Cancel in-flight copies when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.engine = self.engine.with_cancellation(token);
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn engine(&self) -> &ChunkedCopyEngine {
        &self.engine
    }

    /// A second proxy over this proxy's store, with its own copy engine
    pub fn share_store(&self, config: CopyConfig) -> Result<Self> {
        Self::with_store(Arc::clone(&self.store), config)
    }

    /// Whether `other` holds the same store instance, so that parts can be
    /// copied server-side with one set of credentials
    ///
    /// Two stores on the same account with different credentials do not
    /// count; the destination must be written with its own credentials.
    pub fn shares_store_with(&self, other: &StorageProxy) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.store), Arc::as_ptr(&other.store))
    }

    /// Object properties; `to_flat_map` gives the flat key/value view
    pub async fn get_metadata(&self, object: &ObjectRef) -> Result<ObjectMetadata> {
        self.store
            .get_metadata(object)
            .await
            .map_err(|e| Error::metadata_fetch(object.to_string(), e))
    }

    pub async fn list(&self, container: &str, options: &ListOptions) -> Result<Vec<String>> {
        self.store.list(container, options).await
    }

    pub async fn get(&self, object: &ObjectRef) -> Result<Bytes> {
        self.store.get_object(object).await
    }

    pub async fn put(
        &self,
        object: &ObjectRef,
        data: Bytes,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.store.put_object(object, data, metadata).await
    }

    pub async fn delete(&self, object: &ObjectRef) -> Result<()> {
        self.store.delete_object(object).await
    }

    /// Copy `source` from this proxy to `destination` through `target`
    ///
    /// When both proxies hold the same store, parts are copied server-side;
    /// all other copies stream part bytes from this proxy's store into the
    /// target's store. `concurrency`
    /// overrides the configured default for the chosen path.
    pub async fn copy_to(
        &self,
        source: &ObjectRef,
        target: &StorageProxy,
        destination: &ObjectRef,
        concurrency: Option<usize>,
    ) -> Result<CopyOutcome> {
        if self.shares_store_with(target) {
            debug!(source = %source, destination = %destination, "Copying within one store");
            self.engine
                .copy_within(Arc::clone(&self.store), source, destination, concurrency)
                .await
        } else {
            debug!(source = %source, destination = %destination, "Copying between stores");
            self.engine
                .copy_between(
                    Arc::clone(&self.store),
                    Arc::clone(&target.store),
                    source,
                    destination,
                    concurrency,
                )
                .await
        }
    }
}
