//! Remote secret store seam

use crate::value::SecretValue;
use async_trait::async_trait;
use cloud_proxy_core::Result;

/// A remote secret store the cache delegates to on miss or expiry
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the current value of a secret
    ///
    /// Implementations report failures as `Error::SecretFetch` naming the secret.
    async fn fetch(&self, name: &str) -> Result<SecretValue>;

    /// Store name for logging and auditing
    fn name(&self) -> &'static str;
}
