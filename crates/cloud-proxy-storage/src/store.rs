//! Object store abstraction
//!
//! Every storage backend implements [`ObjectStore`]. The copy engine only uses
//! the metadata, range-read and multipart operations; the remaining calls are
//! thin pass-throughs exposed through [`crate::StorageProxy`].

use crate::types::{ListOptions, MultipartSession, ObjectMetadata, ObjectRef, StagedPart};
use async_trait::async_trait;
use bytes::Bytes;
use cloud_proxy_core::{CloudProvider, Result};
use std::collections::BTreeMap;

/// Object storage backend
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Provider family of this store
    fn provider(&self) -> CloudProvider;

    /// Account URL, endpoint or region this store talks to
    fn account(&self) -> &str;

    /// Largest number of parts one multipart session accepts
    fn max_parts(&self) -> u32;

    /// Read object properties
    async fn get_metadata(&self, object: &ObjectRef) -> Result<ObjectMetadata>;

    /// Read `count` bytes starting at `offset`
    async fn read_range(&self, object: &ObjectRef, offset: u64, count: u64) -> Result<Bytes>;

    /// Start a multipart session at `destination` carrying `metadata`
    async fn open_multipart(
        &self,
        destination: &ObjectRef,
        metadata: &BTreeMap<String, String>,
    ) -> Result<MultipartSession>;

    /// Upload one part (index is 1-based)
    async fn stage_part(
        &self,
        session: &MultipartSession,
        index: u32,
        data: Bytes,
    ) -> Result<StagedPart>;

    /// Copy one byte range of `source`, held by this same store, into the session
    async fn stage_part_copy(
        &self,
        session: &MultipartSession,
        index: u32,
        source: &ObjectRef,
        offset: u64,
        count: u64,
    ) -> Result<StagedPart>;

    /// Assemble the staged parts, given in index order
    async fn commit(&self, session: &MultipartSession, parts: &[StagedPart]) -> Result<()>;

    /// Discard the session and everything staged under it
    async fn abort(&self, session: &MultipartSession) -> Result<()>;

    /// Copy a whole object within this store in one call
    async fn copy_object(&self, source: &ObjectRef, destination: &ObjectRef) -> Result<()>;

    /// Read a whole object
    async fn get_object(&self, object: &ObjectRef) -> Result<Bytes>;

    /// Write a whole object
    async fn put_object(
        &self,
        object: &ObjectRef,
        data: Bytes,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Delete an object
    async fn delete_object(&self, object: &ObjectRef) -> Result<()>;

    /// List file keys or folder prefixes in a container
    async fn list(&self, container: &str, options: &ListOptions) -> Result<Vec<String>>;
}
