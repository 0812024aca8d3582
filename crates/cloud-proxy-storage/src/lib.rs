//! Object storage access and chunked large-object copy for cloud-proxy
//!
//! Supported stores:
//! - AWS S3 and S3-compatible endpoints
//! - Azure Blob Storage
//!
//! Objects at or above the large-object threshold are copied by the
//! [`ChunkedCopyEngine`] as a multipart session staged with bounded
//! concurrency and then committed, or aborted on the first part failure.

pub mod azure;
pub mod engine;
pub mod observer;
pub mod plan;
pub mod proxy;
pub mod s3;
pub mod store;
pub mod task_group;
pub mod types;

pub use azure::AzureBlobStore;
pub use engine::{ChunkedCopyEngine, LargeCopy};
pub use observer::{CopyObserver, CopyStats, NoOpObserver, StatsObserver, TracingObserver};
pub use plan::CopyPlan;
pub use proxy::StorageProxy;
pub use s3::S3Store;
pub use store::ObjectStore;
pub use task_group::BoundedTaskGroup;
pub use types::{
    CopyOutcome, CopyStrategy, ListKind, ListOptions, MultipartSession, ObjectMetadata, ObjectRef,
    PartSpec, PartTransfer, StagedPart, DEFAULT_MAX_RESULTS,
};
