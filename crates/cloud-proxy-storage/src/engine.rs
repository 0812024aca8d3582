//! Chunked copy engine
//!
//! Large objects are copied as a multipart session: the object is split into a
//! [`CopyPlan`], every part is transferred under the session with bounded
//! concurrency, and the session is either committed with the parts in index
//! order or aborted. A session receives exactly one of the two.
//!
//! Objects below the large-object threshold are copied with a single call.

use crate::observer::{CopyObserver, TracingObserver};
use crate::plan::CopyPlan;
use crate::store::ObjectStore;
use crate::task_group::BoundedTaskGroup;
use crate::types::{
    CopyOutcome, CopyStrategy, MultipartSession, ObjectRef, PartSpec, PartTransfer, StagedPart,
};
use cloud_proxy_core::{CopyConfig, Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Parameters of one multipart copy
#[derive(Debug, Clone)]
pub struct LargeCopy {
    pub source: ObjectRef,
    pub destination: ObjectRef,
    /// Declared source length
    pub total_length: u64,
    /// User metadata written to the destination
    pub metadata: BTreeMap<String, String>,
    pub transfer: PartTransfer,
    /// Maximum part transfers in flight
    pub concurrency: usize,
}

/// Copies objects between or within object stores
pub struct ChunkedCopyEngine {
    config: CopyConfig,
    observer: Arc<dyn CopyObserver>,
    cancel: CancellationToken,
}

impl ChunkedCopyEngine {
    /// Create an engine; fails when any tuning value is zero
    pub fn new(config: CopyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            observer: Arc::new(TracingObserver),
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the default tracing observer
    pub fn with_observer(mut self, observer: Arc<dyn CopyObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Cancel in-flight copies when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &CopyConfig {
        &self.config
    }

    /// Copy within one store, using server-side range copies for large objects
    pub async fn copy_within(
        &self,
        store: Arc<dyn ObjectStore>,
        source: &ObjectRef,
        destination: &ObjectRef,
        concurrency: Option<usize>,
    ) -> Result<CopyOutcome> {
        let metadata = store
            .get_metadata(source)
            .await
            .map_err(|e| Error::metadata_fetch(source.to_string(), e))?;

        if metadata.content_length < self.config.large_object_threshold {
            debug!(source = %source, destination = %destination, "Single-shot copy within store");
            store.copy_object(source, destination).await?;
            return Ok(single_shot(metadata.content_length));
        }

        let request = LargeCopy {
            source: source.clone(),
            destination: destination.clone(),
            total_length: metadata.content_length,
            metadata: metadata.user,
            transfer: PartTransfer::ServerSide,
            concurrency: concurrency.unwrap_or(self.config.same_provider_concurrency),
        };
        self.copy_large(Arc::clone(&store), store, request).await
    }

    /// Copy between two different stores, streaming part bytes through this process
    pub async fn copy_between(
        &self,
        source_store: Arc<dyn ObjectStore>,
        destination_store: Arc<dyn ObjectStore>,
        source: &ObjectRef,
        destination: &ObjectRef,
        concurrency: Option<usize>,
    ) -> Result<CopyOutcome> {
        let metadata = source_store
            .get_metadata(source)
            .await
            .map_err(|e| Error::metadata_fetch(source.to_string(), e))?;

        if metadata.content_length < self.config.large_object_threshold {
            debug!(source = %source, destination = %destination, "Single-shot copy between stores");
            let data = source_store.get_object(source).await?;
            destination_store
                .put_object(destination, data, &metadata.user)
                .await?;
            return Ok(single_shot(metadata.content_length));
        }

        let request = LargeCopy {
            source: source.clone(),
            destination: destination.clone(),
            total_length: metadata.content_length,
            metadata: metadata.user,
            transfer: PartTransfer::Streamed,
            concurrency: concurrency.unwrap_or(self.config.concurrency),
        };
        self.copy_large(source_store, destination_store, request)
            .await
    }

    /// Plan, open, stage and then commit or abort
    ///
    /// For [`PartTransfer::ServerSide`] the two stores must be the same store.
    pub async fn copy_large(
        &self,
        source_store: Arc<dyn ObjectStore>,
        destination_store: Arc<dyn ObjectStore>,
        request: LargeCopy,
    ) -> Result<CopyOutcome> {
        let group = BoundedTaskGroup::with_parent(request.concurrency, &self.cancel)?;
        let plan = CopyPlan::new(
            request.total_length,
            self.config.base_chunk_size,
            destination_store.max_parts(),
        )?;
        self.observer.on_plan(&request.destination, &plan);

        let started = Instant::now();
        let session = Arc::new(
            destination_store
                .open_multipart(&request.destination, &request.metadata)
                .await?,
        );
        debug!(
            destination = %request.destination,
            session = %session.session_id,
            parts = plan.len(),
            concurrency = request.concurrency,
            "Opened multipart session"
        );

        let source = Arc::new(request.source.clone());
        let transfer = request.transfer;
        let staged = group
            .run("stage_part", plan.parts.clone(), |part, token| {
                let source_store = Arc::clone(&source_store);
                let destination_store = Arc::clone(&destination_store);
                let session = Arc::clone(&session);
                let source = Arc::clone(&source);
                let observer = Arc::clone(&self.observer);
                async move {
                    if token.is_cancelled() {
                        return Err(Error::cancelled(
                            "stage_part",
                            session.destination.to_string(),
                        ));
                    }

                    let result = transfer_part(
                        transfer,
                        source_store.as_ref(),
                        destination_store.as_ref(),
                        &session,
                        &source,
                        part,
                    )
                    .await;

                    match result {
                        Ok(staged) => {
                            observer.on_part_staged(&session.destination, &staged, part.count);
                            Ok(staged)
                        }
                        Err(err) => {
                            observer.on_part_failed(&session.destination, part.index, &err);
                            Err(Error::Staging {
                                key: session.destination.key.clone(),
                                part: part.index,
                                source: Box::new(err),
                            })
                        }
                    }
                }
            })
            .await;

        let mut parts = match staged {
            Ok(parts) => parts,
            Err(err) => {
                if let Err(abort_err) = destination_store.abort(&session).await {
                    warn!(
                        destination = %request.destination,
                        session = %session.session_id,
                        error = %abort_err,
                        "Failed to abort multipart session"
                    );
                }
                self.observer.on_aborted(&request.destination, &err);
                return Err(err);
            }
        };

        parts.sort_by_key(|p| p.index);
        destination_store
            .commit(&session, &parts)
            .await
            .map_err(|e| Error::Commit {
                key: request.destination.key.clone(),
                source: Box::new(e),
            })?;

        self.observer.on_committed(
            &request.destination,
            parts.len(),
            request.total_length,
            started.elapsed(),
        );
        info!(
            source = %request.source,
            destination = %request.destination,
            bytes = request.total_length,
            parts = parts.len(),
            "Copied large object"
        );

        Ok(CopyOutcome {
            strategy: CopyStrategy::Multipart,
            bytes: request.total_length,
            parts: parts.len(),
        })
    }
}

async fn transfer_part(
    transfer: PartTransfer,
    source_store: &dyn ObjectStore,
    destination_store: &dyn ObjectStore,
    session: &MultipartSession,
    source: &ObjectRef,
    part: PartSpec,
) -> Result<StagedPart> {
    match transfer {
        PartTransfer::Streamed => {
            let data = source_store
                .read_range(source, part.offset, part.count)
                .await?;
            destination_store
                .stage_part(session, part.index, data)
                .await
        }
        PartTransfer::ServerSide => {
            destination_store
                .stage_part_copy(session, part.index, source, part.offset, part.count)
                .await
        }
    }
}

fn single_shot(bytes: u64) -> CopyOutcome {
    CopyOutcome {
        strategy: CopyStrategy::SingleShot,
        bytes,
        parts: 1,
    }
}
