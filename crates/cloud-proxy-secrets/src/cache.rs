//! Time and capacity bounded secret cache
//!
//! Sits in front of a slow, rate-limited [`SecretStore`]. Entries are checked
//! for expiry lazily at read time; there is no background sweep. When an
//! insertion pushes the cache past its capacity, the cache is rebuilt with only
//! the most recently fetched entries.
//!
//! The whole read, fetch, insert and evict sequence for one lookup runs under a
//! single async mutex, so concurrent lookups of a cold key produce one remote
//! fetch, not several.

use crate::store::SecretStore;
use crate::value::SecretValue;
use cloud_proxy_core::{Error, Result, SecretCacheConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Statistics about cache usage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that went to the remote store
    pub misses: u64,
    /// Misses caused by a stale entry
    pub expired: u64,
    /// Entries dropped by capacity eviction
    pub evictions: u64,
    /// Current number of cached entries
    pub entries: usize,
}

impl CacheStats {
    /// Get hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct CachedSecret {
    value: SecretValue,
    fetched_at: Instant,
    /// Upsert order; breaks ties between equal `fetched_at`
    seq: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CachedSecret>,
    next_seq: u64,
    stats: CacheStats,
}

/// In-memory secret cache owned by one secrets proxy
pub struct SecretCache {
    store: Arc<dyn SecretStore>,
    state: Mutex<CacheState>,
    max_entries: usize,
    ttl: Duration,
}

impl SecretCache {
    /// Create a cache over `store`
    ///
    /// Fails with a configuration error when `max_entries` is zero.
    pub fn new(store: Arc<dyn SecretStore>, max_entries: usize, ttl: Duration) -> Result<Self> {
        if max_entries == 0 {
            return Err(Error::configuration(
                "secret cache max-entries must be greater than zero",
            ));
        }

        Ok(Self {
            store,
            state: Mutex::new(CacheState::default()),
            max_entries,
            ttl,
        })
    }

    /// Create a cache from configuration
    pub fn from_config(store: Arc<dyn SecretStore>, config: &SecretCacheConfig) -> Result<Self> {
        Self::new(store, config.max_entries, config.ttl())
    }

    /// Capacity bound
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a secret, fetching it when absent or stale
    ///
    /// A failed fetch leaves the cache exactly as it was, including any stale
    /// entry for `name`.
    pub async fn get(&self, name: &str) -> Result<SecretValue> {
        if name.trim().is_empty() {
            return Err(Error::configuration("secret name must not be empty"));
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let stale = match state.entries.get(name) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => {
                let value = entry.value.clone();
                state.stats.hits += 1;
                trace!(secret = %name, "Secret cache hit");
                return Ok(value);
            }
            Some(_) => true,
            None => false,
        };

        state.stats.misses += 1;
        if stale {
            state.stats.expired += 1;
            debug!(secret = %name, "Cached secret expired, refetching");
        } else {
            debug!(secret = %name, "Secret cache miss");
        }

        let value = self.store.fetch(name).await?;

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            name.to_string(),
            CachedSecret {
                value: value.clone(),
                fetched_at: Instant::now(),
                seq,
            },
        );

        if state.entries.len() > self.max_entries {
            self.evict(state);
        }

        Ok(value)
    }

    /// Rebuild the entry map keeping the `max_entries` most recently fetched
    fn evict(&self, state: &mut CacheState) {
        let before = state.entries.len();
        let mut ranked: Vec<(String, CachedSecret)> = state.entries.drain().collect();
        ranked.sort_by(|(_, a), (_, b)| {
            b.fetched_at
                .cmp(&a.fetched_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });
        ranked.truncate(self.max_entries);
        state.entries = ranked.into_iter().collect();

        let evicted = before - state.entries.len();
        state.stats.evictions += evicted as u64;
        debug!(
            evicted,
            remaining = state.entries.len(),
            "Evicted secrets over capacity"
        );
    }

    /// Whether a fresh entry exists for `name`
    pub async fn contains(&self, name: &str) -> bool {
        let state = self.state.lock().await;
        state
            .entries
            .get(name)
            .is_some_and(|entry| entry.fetched_at.elapsed() < self.ttl)
    }

    /// Number of entries, fresh or stale
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Names currently held, fresh or stale
    pub async fn names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut names: Vec<String> = state.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop one entry; returns whether it was present
    pub async fn invalidate(&self, name: &str) -> bool {
        let removed = self.state.lock().await.entries.remove(name).is_some();
        if removed {
            debug!(secret = %name, "Invalidated cached secret");
        }
        removed
    }

    /// Drop every entry and reset statistics
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.stats = CacheStats::default();
        debug!("Cleared secret cache");
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            entries: state.entries.len(),
            ..state.stats.clone()
        }
    }
}
