//! Bounded parallel task group
//!
//! Runs one task per input with at most `limit` tasks in flight. Tasks are
//! dispatched in batches: up to `limit` are spawned, all of them are awaited,
//! then the next batch is spawned. The first failure cancels the group's
//! [`CancellationToken`]; tasks still running observe it and stop, and no
//! further batch is dispatched. Only the first error is kept.

use cloud_proxy_core::{Error, Result};
use std::future::Future;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// A cancellable scope running tasks with bounded concurrency
#[derive(Debug)]
pub struct BoundedTaskGroup {
    limit: usize,
    token: CancellationToken,
}

impl BoundedTaskGroup {
    /// Create a group with its own cancellation scope
    pub fn new(limit: usize) -> Result<Self> {
        Self::with_token(limit, CancellationToken::new())
    }

    /// Create a group cancelled whenever `parent` is
    pub fn with_parent(limit: usize, parent: &CancellationToken) -> Result<Self> {
        Self::with_token(limit, parent.child_token())
    }

    fn with_token(limit: usize, token: CancellationToken) -> Result<Self> {
        if limit == 0 {
            return Err(Error::configuration("concurrency must be greater than zero"));
        }
        Ok(Self { limit, token })
    }

    /// Maximum tasks in flight
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Token cancelled on first failure
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel the group from outside
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Run `task` for every input and return the outputs in input order
    ///
    /// Each task receives a clone of the group token. A task that fails
    /// cancels the group; its error is returned once every spawned task has
    /// finished. When the group is cancelled from outside with no task
    /// failure, the result is a cancellation error naming `operation`.
    pub async fn run<I, T, F, Fut>(
        &self,
        operation: &'static str,
        inputs: Vec<I>,
        task: F,
    ) -> Result<Vec<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let total = inputs.len();
        let mut outputs: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();
        let mut first_error: Option<Error> = None;
        let mut pending = inputs.into_iter().enumerate().peekable();

        while pending.peek().is_some() && first_error.is_none() && !self.token.is_cancelled() {
            let mut batch = JoinSet::new();
            for (slot, input) in pending.by_ref().take(self.limit) {
                let token = self.token.clone();
                let work = task(input, token.clone());
                batch.spawn(async move {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => (slot, None),
                        result = work => (slot, Some(result)),
                    }
                });
            }
            trace!(operation, in_flight = batch.len(), "Dispatched batch");

            while let Some(joined) = batch.join_next().await {
                let failure = match joined {
                    Ok((slot, Some(Ok(output)))) => {
                        outputs[slot] = Some(output);
                        None
                    }
                    Ok((_, Some(Err(err)))) => Some(err),
                    Ok((_, None)) => None,
                    Err(join_err) => Some(Error::provider(operation, "task", join_err)),
                };

                if let Some(err) = failure {
                    if first_error.is_none() {
                        debug!(operation, error = %err, "Task failed, cancelling group");
                        self.token.cancel();
                        first_error = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        let completed: Vec<T> = outputs.into_iter().flatten().collect();
        if completed.len() != total {
            return Err(Error::cancelled(
                operation,
                format!("{} of {} tasks completed", completed.len(), total),
            ));
        }
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_outputs_in_input_order() {
        let group = BoundedTaskGroup::new(3).unwrap();
        let outputs = group
            .run("square", (1..=7u64).collect::<Vec<_>>(), |n, _| async move {
                tokio::time::sleep(Duration::from_millis(10 * (8 - n))).await;
                Ok(n * n)
            })
            .await
            .unwrap();
        assert_eq!(outputs, vec![1, 4, 9, 16, 25, 36, 49]);
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_limit() {
        let group = BoundedTaskGroup::new(4).unwrap();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        group
            .run("count", (0..20).collect::<Vec<u32>>(), |_, _| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_first_error_stops_dispatch() {
        let group = BoundedTaskGroup::new(2).unwrap();
        let started = Arc::new(AtomicUsize::new(0));

        let err = group
            .run("fail", (1..=10u32).collect::<Vec<_>>(), |n, _| {
                let started = Arc::clone(&started);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    if n == 3 {
                        Err(Error::configuration(format!("task {n} failed")))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("task 3 failed"));
        assert!(group.token().is_cancelled());
        // batches [1,2] and [3,4] only
        assert!(started.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_slow_task_observes_cancellation() {
        let group = BoundedTaskGroup::new(2).unwrap();
        let finished = Arc::new(AtomicUsize::new(0));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            group.run("cancel", vec![1u32, 2], |n, _| {
                let finished = Arc::clone(&finished);
                async move {
                    if n == 1 {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    } else {
                        Err(Error::configuration("boom"))
                    }
                }
            }),
        )
        .await
        .expect("group should return promptly");

        assert!(result.is_err());
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parent_cancellation_reported() {
        let parent = CancellationToken::new();
        let group = BoundedTaskGroup::with_parent(2, &parent).unwrap();
        parent.cancel();

        let err = group
            .run("noop", vec![1u32, 2, 3], |n, _| async move { Ok(n) })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(BoundedTaskGroup::new(0).unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let group = BoundedTaskGroup::new(1).unwrap();
        let out: Vec<u32> = group
            .run("empty", Vec::<u32>::new(), |n, _| async move { Ok(n) })
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
