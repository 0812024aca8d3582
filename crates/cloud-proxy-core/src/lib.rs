//! # cloud-proxy-core
//!
//! Core library for cloud-proxy providing:
//! - Error taxonomy shared by the secrets and storage crates
//! - Layered configuration (defaults, YAML file, environment)
//! - Credential variants and Azure request authorization

pub mod azure;
pub mod config;
pub mod credentials;
pub mod error;
pub mod secure;
pub mod utils;

pub use config::{ConfigLoader, CopyConfig, ProxyConfig, SecretCacheConfig};
pub use credentials::{CloudProvider, Credentials, SasEndpoint};
pub use error::{BoxError, Error, HttpStatusError, Result};
pub use secure::SecureString;
