//! Configuration loading and management

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    CopyConfig, ProxyConfig, SecretCacheConfig, DEFAULT_BASE_CHUNK_SIZE,
    DEFAULT_LARGE_OBJECT_THRESHOLD,
};
