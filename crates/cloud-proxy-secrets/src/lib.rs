//! Cached secret retrieval for cloud-proxy
//!
//! Supported stores:
//! - AWS Secrets Manager
//! - Azure Key Vault
//!
//! Each [`SecretsProxy`] owns one [`SecretCache`] bounded by entry count and
//! TTL. Secret values are zeroed on drop and never logged.

pub mod audit;
pub mod aws;
pub mod azure;
pub mod cache;
pub mod proxy;
pub mod store;
pub mod value;

pub use aws::SecretsManagerStore;
pub use azure::KeyVaultStore;
pub use cache::{CacheStats, SecretCache};
pub use proxy::SecretsProxy;
pub use store::SecretStore;
pub use value::SecretValue;
