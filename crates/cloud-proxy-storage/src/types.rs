//! Object storage types

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Default cap on listing results
pub const DEFAULT_MAX_RESULTS: usize = 500;

/// A container (bucket) plus an object key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub container: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.key)
    }
}

/// Object properties read before a copy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Declared object length in bytes
    pub content_length: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    /// User-defined metadata, the only part written to copy destinations
    pub user: BTreeMap<String, String>,
}

impl ObjectMetadata {
    pub fn new(content_length: u64) -> Self {
        Self {
            content_length,
            ..Default::default()
        }
    }

    /// User metadata plus `content_length` and `last_modified` (RFC 3339)
    pub fn to_flat_map(&self) -> BTreeMap<String, String> {
        let mut map = self.user.clone();
        map.insert(
            "content_length".to_string(),
            self.content_length.to_string(),
        );
        if let Some(modified) = self.last_modified {
            map.insert(
                "last_modified".to_string(),
                modified.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        }
        map
    }
}

/// What a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListKind {
    /// Object keys directly under the prefix
    #[default]
    Files,
    /// Common prefixes ending in `/`
    Folders,
}

/// Listing parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub prefix: Option<String>,
    pub kind: ListKind,
    pub max_results: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            kind: ListKind::Files,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl ListOptions {
    pub fn files(prefix: Option<String>) -> Self {
        Self {
            prefix,
            ..Default::default()
        }
    }

    pub fn folders(prefix: Option<String>) -> Self {
        Self {
            prefix,
            kind: ListKind::Folders,
            ..Default::default()
        }
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = if max == 0 { DEFAULT_MAX_RESULTS } else { max };
        self
    }

    /// Effective result cap, treating zero as the default
    pub fn limit(&self) -> usize {
        if self.max_results == 0 {
            DEFAULT_MAX_RESULTS
        } else {
            self.max_results
        }
    }
}

/// One contiguous byte range of a copy plan (index is 1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpec {
    pub index: u32,
    pub offset: u64,
    pub count: u64,
}

/// A part accepted by the destination under a multipart session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPart {
    pub index: u32,
    /// ETag for S3, block id for Azure
    pub token: String,
}

/// Provider-side handle grouping staged parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartSession {
    pub session_id: String,
    pub destination: ObjectRef,
    pub metadata: BTreeMap<String, String>,
}

/// How each part reaches the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartTransfer {
    /// Read the range from the source store and upload the bytes
    Streamed,
    /// Ask the destination store to copy the range itself
    ServerSide,
}

/// Which path a copy took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStrategy {
    SingleShot,
    Multipart,
}

impl fmt::Display for CopyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyStrategy::SingleShot => write!(f, "single-shot"),
            CopyStrategy::Multipart => write!(f, "multipart"),
        }
    }
}

/// Result of a successful copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub strategy: CopyStrategy,
    pub bytes: u64,
    /// Number of parts committed; 1 for single-shot copies
    pub parts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_flat_map_adds_length_and_modified() {
        let mut metadata = ObjectMetadata::new(1024);
        metadata.last_modified = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        metadata
            .user
            .insert("owner".to_string(), "data-team".to_string());

        let map = metadata.to_flat_map();
        assert_eq!(map["content_length"], "1024");
        assert_eq!(map["last_modified"], "2024-03-01T12:00:00Z");
        assert_eq!(map["owner"], "data-team");
        assert_eq!(metadata.user.len(), 1);
    }

    #[test]
    fn test_list_options_zero_max_uses_default() {
        let options = ListOptions::folders(Some("logs/".to_string())).with_max_results(0);
        assert_eq!(options.max_results, DEFAULT_MAX_RESULTS);
        assert_eq!(options.kind, ListKind::Folders);
    }

    #[test]
    fn test_object_ref_display() {
        assert_eq!(ObjectRef::new("bucket", "a/b.bin").to_string(), "bucket/a/b.bin");
    }
}
