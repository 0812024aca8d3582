//! Copy progress observation
//!
//! This module provides the `CopyObserver` trait for monitoring chunked copies
//! and a `TracingObserver` implementation that logs using the `tracing` crate.

use crate::plan::CopyPlan;
use crate::types::{ObjectRef, StagedPart};
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Observer trait for chunked copy events
///
/// Part callbacks run on worker tasks and may arrive in any order.
pub trait CopyObserver: Send + Sync {
    /// Called once the plan is computed, before the session is opened
    fn on_plan(&self, destination: &ObjectRef, plan: &CopyPlan);

    /// Called when the destination accepted a part
    fn on_part_staged(&self, destination: &ObjectRef, part: &StagedPart, bytes: u64);

    /// Called when a part transfer failed
    fn on_part_failed(&self, destination: &ObjectRef, index: u32, error: &dyn Error);

    /// Called after a successful commit
    fn on_committed(&self, destination: &ObjectRef, parts: usize, bytes: u64, elapsed: Duration);

    /// Called after the session was aborted
    fn on_aborted(&self, destination: &ObjectRef, error: &dyn Error) {
        let _ = (destination, error);
    }
}

/// A no-op observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl CopyObserver for NoOpObserver {
    fn on_plan(&self, _destination: &ObjectRef, _plan: &CopyPlan) {}

    fn on_part_staged(&self, _destination: &ObjectRef, _part: &StagedPart, _bytes: u64) {}

    fn on_part_failed(&self, _destination: &ObjectRef, _index: u32, _error: &dyn Error) {}

    fn on_committed(&self, _destination: &ObjectRef, _parts: usize, _bytes: u64, _elapsed: Duration) {}
}

/// An observer that logs copy events using the `tracing` crate
///
/// # Log Levels
///
/// - `on_plan`: DEBUG
/// - `on_part_staged`: TRACE
/// - `on_part_failed`: ERROR
/// - `on_committed`: INFO
/// - `on_aborted`: WARN
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CopyObserver for TracingObserver {
    fn on_plan(&self, destination: &ObjectRef, plan: &CopyPlan) {
        tracing::debug!(
            destination = %destination,
            total_length = plan.total_length,
            part_size = plan.part_size,
            parts = plan.len(),
            "planned chunked copy"
        );
    }

    fn on_part_staged(&self, destination: &ObjectRef, part: &StagedPart, bytes: u64) {
        tracing::trace!(
            destination = %destination,
            part = part.index,
            bytes = bytes,
            "part staged"
        );
    }

    fn on_part_failed(&self, destination: &ObjectRef, index: u32, error: &dyn Error) {
        tracing::error!(
            destination = %destination,
            part = index,
            error = %error,
            "part transfer failed"
        );
    }

    fn on_committed(&self, destination: &ObjectRef, parts: usize, bytes: u64, elapsed: Duration) {
        tracing::info!(
            destination = %destination,
            parts = parts,
            bytes = bytes,
            duration_ms = elapsed.as_millis() as u64,
            "chunked copy committed"
        );
    }

    fn on_aborted(&self, destination: &ObjectRef, error: &dyn Error) {
        tracing::warn!(
            destination = %destination,
            error = %error,
            "chunked copy aborted"
        );
    }
}

/// An observer that counts events
#[derive(Debug, Default)]
pub struct StatsObserver {
    plans: AtomicU64,
    parts_staged: AtomicU64,
    parts_failed: AtomicU64,
    bytes_staged: AtomicU64,
    commits: AtomicU64,
    aborts: AtomicU64,
}

/// Point-in-time counts from a [`StatsObserver`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub plans: u64,
    pub parts_staged: u64,
    pub parts_failed: u64,
    pub bytes_staged: u64,
    pub commits: u64,
    pub aborts: u64,
}

impl StatsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CopyStats {
        CopyStats {
            plans: self.plans.load(Ordering::Relaxed),
            parts_staged: self.parts_staged.load(Ordering::Relaxed),
            parts_failed: self.parts_failed.load(Ordering::Relaxed),
            bytes_staged: self.bytes_staged.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
        }
    }
}

impl CopyObserver for StatsObserver {
    fn on_plan(&self, _destination: &ObjectRef, _plan: &CopyPlan) {
        self.plans.fetch_add(1, Ordering::Relaxed);
    }

    fn on_part_staged(&self, _destination: &ObjectRef, _part: &StagedPart, bytes: u64) {
        self.parts_staged.fetch_add(1, Ordering::Relaxed);
        self.bytes_staged.fetch_add(bytes, Ordering::Relaxed);
    }

    fn on_part_failed(&self, _destination: &ObjectRef, _index: u32, _error: &dyn Error) {
        self.parts_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn on_committed(&self, _destination: &ObjectRef, _parts: usize, _bytes: u64, _elapsed: Duration) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    fn on_aborted(&self, _destination: &ObjectRef, _error: &dyn Error) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_observer_counts() {
        let observer = StatsObserver::new();
        let dest = ObjectRef::new("bucket", "key");
        let plan = CopyPlan::new(100, 10, 100).unwrap();
        let part = StagedPart {
            index: 1,
            token: "etag-1".to_string(),
        };
        let err = std::io::Error::other("boom");

        observer.on_plan(&dest, &plan);
        observer.on_part_staged(&dest, &part, 10);
        observer.on_part_staged(&dest, &part, 15);
        observer.on_part_failed(&dest, 3, &err);
        observer.on_aborted(&dest, &err);

        let stats = observer.snapshot();
        assert_eq!(stats.plans, 1);
        assert_eq!(stats.parts_staged, 2);
        assert_eq!(stats.bytes_staged, 25);
        assert_eq!(stats.parts_failed, 1);
        assert_eq!(stats.aborts, 1);
        assert_eq!(stats.commits, 0);
    }

    #[test]
    fn test_tracing_observer_does_not_panic() {
        let observer = TracingObserver;
        let dest = ObjectRef::new("c", "k");
        let err = std::io::Error::other("boom");
        observer.on_part_failed(&dest, 2, &err);
        observer.on_committed(&dest, 4, 1024, Duration::from_millis(12));
        observer.on_aborted(&dest, &err);
        NoOpObserver.on_aborted(&dest, &err);
    }
}
