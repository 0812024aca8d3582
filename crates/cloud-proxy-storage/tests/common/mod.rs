//! Common test helpers for cloud-proxy-storage integration tests
//!
//! Provides an in-memory object store that records every collaborator call,
//! counts commits and aborts, and tracks how many part transfers were in
//! flight at once.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use cloud_proxy_core::{CloudProvider, CopyConfig, Error, HttpStatusError, Result};
use cloud_proxy_storage::{
    ListKind, ListOptions, MultipartSession, ObjectMetadata, ObjectRef, ObjectStore, StagedPart,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A recorded collaborator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetMetadata(String),
    ReadRange { offset: u64, count: u64 },
    Open(String),
    Stage(u32),
    StageCopy { index: u32, offset: u64, count: u64 },
    Commit(Vec<u32>),
    Abort,
    CopyObject,
    GetObject,
    PutObject,
}

#[derive(Default)]
struct State {
    objects: HashMap<ObjectRef, (Bytes, BTreeMap<String, String>)>,
    staged: HashMap<(String, u32), Bytes>,
    calls: Vec<Call>,
    completions: Vec<u32>,
}

/// In-memory object store with failure and latency injection
pub struct MemoryStore {
    account: String,
    max_parts: u32,
    state: Mutex<State>,
    failing_part: Option<u32>,
    fail_metadata: bool,
    fail_commit: bool,
    delays: HashMap<u32, Duration>,
    default_delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    sessions: AtomicUsize,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn new(account: &str) -> Self {
        Self {
            account: account.to_string(),
            max_parts: 10_000,
            state: Mutex::new(State::default()),
            failing_part: None,
            fail_metadata: false,
            fail_commit: false,
            delays: HashMap::new(),
            default_delay: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            sessions: AtomicUsize::new(0),
        }
    }

    /// Staging part `index` fails with a 500
    pub fn failing_part(mut self, index: u32) -> Self {
        self.failing_part = Some(index);
        self
    }

    pub fn failing_metadata(mut self) -> Self {
        self.fail_metadata = true;
        self
    }

    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Staging part `index` takes `delay`
    pub fn part_delay(mut self, index: u32, delay: Duration) -> Self {
        self.delays.insert(index, delay);
        self
    }

    /// Every part without its own delay takes `delay`
    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
        self
    }

    pub fn with_max_parts(mut self, max_parts: u32) -> Self {
        self.max_parts = max_parts;
        self
    }

    pub fn with_object(self, object: &ObjectRef, data: Bytes) -> Self {
        self.insert(object, data, BTreeMap::new());
        self
    }

    pub fn with_object_metadata(
        self,
        object: &ObjectRef,
        data: Bytes,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        self.insert(object, data, metadata);
        self
    }

    fn insert(&self, object: &ObjectRef, data: Bytes, metadata: BTreeMap<String, String>) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(object.clone(), (data, metadata));
    }

    pub fn object(&self, object: &ObjectRef) -> Option<Bytes> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(object)
            .map(|(data, _)| data.clone())
    }

    pub fn object_metadata(&self, object: &ObjectRef) -> Option<BTreeMap<String, String>> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(object)
            .map(|(_, metadata)| metadata.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    pub fn commits(&self) -> Vec<Vec<u32>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Commit(indices) => Some(indices),
                _ => None,
            })
            .collect()
    }

    pub fn aborts(&self) -> usize {
        self.count(|c| matches!(c, Call::Abort))
    }

    pub fn opens(&self) -> usize {
        self.count(|c| matches!(c, Call::Open(_)))
    }

    /// Part indices in the order their transfers finished
    pub fn completions(&self) -> Vec<u32> {
        self.state.lock().unwrap().completions.clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    /// Simulated transfer shared by streamed and server-side staging
    async fn transfer(&self, session: &MultipartSession, index: u32, data: Bytes) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(&index).copied().or(self.default_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_part == Some(index) {
            return Err(Error::provider(
                "stage_part",
                session.destination.to_string(),
                HttpStatusError::new(500, "injected failure"),
            ));
        }

        let mut state = self.state.lock().unwrap();
        state.completions.push(index);
        state
            .staged
            .insert((session.session_id.clone(), index), data);
        Ok(())
    }

    fn slice(&self, object: &ObjectRef, offset: u64, count: u64) -> Result<Bytes> {
        let state = self.state.lock().unwrap();
        let (data, _) = state.objects.get(object).ok_or_else(|| not_found(object))?;
        let start = offset as usize;
        let end = (offset + count) as usize;
        if end > data.len() {
            return Err(Error::provider(
                "read_range",
                object.to_string(),
                HttpStatusError::new(416, "range not satisfiable"),
            ));
        }
        Ok(data.slice(start..end))
    }
}

fn not_found(object: &ObjectRef) -> Error {
    Error::provider(
        "get_object",
        object.to_string(),
        HttpStatusError::new(404, "not found"),
    )
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Aws
    }

    fn account(&self) -> &str {
        &self.account
    }

    fn max_parts(&self) -> u32 {
        self.max_parts
    }

    async fn get_metadata(&self, object: &ObjectRef) -> Result<ObjectMetadata> {
        self.record(Call::GetMetadata(object.key.clone()));
        if self.fail_metadata {
            return Err(Error::provider(
                "head_object",
                object.to_string(),
                HttpStatusError::new(403, "forbidden"),
            ));
        }
        let state = self.state.lock().unwrap();
        let (data, user) = state.objects.get(object).ok_or_else(|| not_found(object))?;
        Ok(ObjectMetadata {
            content_length: data.len() as u64,
            user: user.clone(),
            ..Default::default()
        })
    }

    async fn read_range(&self, object: &ObjectRef, offset: u64, count: u64) -> Result<Bytes> {
        self.record(Call::ReadRange { offset, count });
        self.slice(object, offset, count)
    }

    async fn open_multipart(
        &self,
        destination: &ObjectRef,
        metadata: &BTreeMap<String, String>,
    ) -> Result<MultipartSession> {
        self.record(Call::Open(destination.key.clone()));
        let n = self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(MultipartSession {
            session_id: format!("session-{n}"),
            destination: destination.clone(),
            metadata: metadata.clone(),
        })
    }

    async fn stage_part(
        &self,
        session: &MultipartSession,
        index: u32,
        data: Bytes,
    ) -> Result<StagedPart> {
        self.record(Call::Stage(index));
        self.transfer(session, index, data).await?;
        Ok(StagedPart {
            index,
            token: format!("etag-{index}"),
        })
    }

    async fn stage_part_copy(
        &self,
        session: &MultipartSession,
        index: u32,
        source: &ObjectRef,
        offset: u64,
        count: u64,
    ) -> Result<StagedPart> {
        self.record(Call::StageCopy {
            index,
            offset,
            count,
        });
        let data = self.slice(source, offset, count)?;
        self.transfer(session, index, data).await?;
        Ok(StagedPart {
            index,
            token: format!("etag-{index}"),
        })
    }

    async fn commit(&self, session: &MultipartSession, parts: &[StagedPart]) -> Result<()> {
        self.record(Call::Commit(parts.iter().map(|p| p.index).collect()));
        if self.fail_commit {
            return Err(Error::provider(
                "commit",
                session.destination.to_string(),
                HttpStatusError::new(400, "InvalidPart"),
            ));
        }
        let mut state = self.state.lock().unwrap();
        let mut assembled = BytesMut::new();
        for part in parts {
            let data = state
                .staged
                .remove(&(session.session_id.clone(), part.index))
                .ok_or_else(|| {
                    Error::provider(
                        "commit",
                        session.destination.to_string(),
                        format!("part {} was never staged", part.index),
                    )
                })?;
            assembled.extend_from_slice(&data);
        }
        state.objects.insert(
            session.destination.clone(),
            (assembled.freeze(), session.metadata.clone()),
        );
        Ok(())
    }

    async fn abort(&self, session: &MultipartSession) -> Result<()> {
        self.record(Call::Abort);
        self.state
            .lock()
            .unwrap()
            .staged
            .retain(|(id, _), _| id != &session.session_id);
        Ok(())
    }

    async fn copy_object(&self, source: &ObjectRef, destination: &ObjectRef) -> Result<()> {
        self.record(Call::CopyObject);
        let mut state = self.state.lock().unwrap();
        let entry = state
            .objects
            .get(source)
            .cloned()
            .ok_or_else(|| not_found(source))?;
        state.objects.insert(destination.clone(), entry);
        Ok(())
    }

    async fn get_object(&self, object: &ObjectRef) -> Result<Bytes> {
        self.record(Call::GetObject);
        self.object(object).ok_or_else(|| not_found(object))
    }

    async fn put_object(
        &self,
        object: &ObjectRef,
        data: Bytes,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.record(Call::PutObject);
        self.insert(object, data, metadata.clone());
        Ok(())
    }

    async fn delete_object(&self, object: &ObjectRef) -> Result<()> {
        self.state.lock().unwrap().objects.remove(object);
        Ok(())
    }

    async fn list(&self, container: &str, options: &ListOptions) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let prefix = options.prefix.clone().unwrap_or_default();
        let mut items: Vec<String> = state
            .objects
            .keys()
            .filter(|o| o.container == container && o.key.starts_with(&prefix))
            .filter_map(|o| {
                let rest = &o.key[prefix.len()..];
                match (options.kind, rest.find('/')) {
                    (ListKind::Files, None) => Some(o.key.clone()),
                    (ListKind::Folders, Some(i)) => Some(format!("{prefix}{}", &rest[..=i])),
                    _ => None,
                }
            })
            .collect();
        items.sort();
        items.dedup();
        items.truncate(options.limit());
        Ok(items)
    }
}

/// Deterministic payload of `len` bytes
#[allow(dead_code)]
pub fn payload(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

/// Copy settings with a tiny threshold so tests stay small
#[allow(dead_code)]
pub fn small_config(concurrency: usize) -> CopyConfig {
    CopyConfig {
        large_object_threshold: 50,
        base_chunk_size: 10,
        concurrency,
        same_provider_concurrency: concurrency,
    }
}

#[allow(dead_code)]
pub fn shared(store: MemoryStore) -> Arc<MemoryStore> {
    Arc::new(store)
}
