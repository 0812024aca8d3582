//! Shared utility functions for cloud-proxy crates

use crate::error::{Error, Result};
use camino::Utf8PathBuf;

/// Get the user's home directory
///
/// Prefers the HOME environment variable over dirs::home_dir() so that
/// container setups overriding HOME are respected.
pub fn get_home_dir() -> Result<Utf8PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        return Ok(Utf8PathBuf::from(home));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| Error::configuration("could not determine home directory"))?;
    Utf8PathBuf::from_path_buf(home)
        .map_err(|p| Error::configuration(format!("home directory is not UTF-8: {}", p.display())))
}

/// Default configuration directory (`~/.cloud-proxy`)
pub fn config_home() -> Result<Utf8PathBuf> {
    Ok(get_home_dir()?.join(".cloud-proxy"))
}

/// Normalize a metadata key read from a provider (spaces to `_`, lowercase)
pub fn normalize_metadata_key(key: &str) -> String {
    key.replace(' ', "_").to_lowercase()
}

/// Inclusive HTTP byte range covering `count` bytes from `offset`
///
/// `count` must be non-zero.
pub fn format_byte_range(offset: u64, count: u64) -> String {
    format!("bytes={}-{}", offset, offset + count.saturating_sub(1))
}
