//! Bounded worker pool for job executions.
//!
//! Submissions never block the caller. Each submitted future waits for one of
//! `max_workers` permits before it runs, so at most that many execute at once.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::WorkerPoolConfig;

/// Pool errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    Closed,
}

/// Worker pool.
pub struct WorkerPool {
    max_workers: usize,
    semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
    abandon: CancellationToken,
    active: Arc<AtomicUsize>,
    total_completed: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Create a new worker pool.
    pub fn new(config: &WorkerPoolConfig) -> Self {
        let max_workers = config.max_workers.max(1);
        Self {
            max_workers,
            semaphore: Arc::new(Semaphore::new(max_workers)),
            tracker: TaskTracker::new(),
            abandon: CancellationToken::new(),
            active: Arc::new(AtomicUsize::new(0)),
            total_completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Worker limit.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Permits not currently held.
    pub fn available_workers(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Number of futures currently executing.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Submitted futures not yet finished, queued or executing.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Futures that ran to completion.
    pub fn total_completed(&self) -> u64 {
        self.total_completed.load(Ordering::SeqCst)
    }

    /// Whether the pool still accepts work.
    pub fn is_accepting(&self) -> bool {
        !self.tracker.is_closed()
    }

    /// Token cancelled when shutdown gives up on remaining work. Long-running
    /// futures may watch it to record their abandonment.
    pub fn abandon_token(&self) -> CancellationToken {
        self.abandon.clone()
    }

    /// Queue a future for execution.
    pub fn submit<F>(&self, name: impl Into<String>, fut: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(PoolError::Closed);
        }

        let name = name.into();
        let semaphore = self.semaphore.clone();
        let abandon = self.abandon.clone();
        let active = self.active.clone();
        let total_completed = self.total_completed.clone();
        let span = info_span!("pool_worker", work = %name);

        self.tracker.spawn(
            async move {
                let permit = tokio::select! {
                    biased;
                    _ = abandon.cancelled() => {
                        debug!("Dropped queued work at shutdown");
                        return;
                    }
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                active.fetch_add(1, Ordering::SeqCst);
                let mut fut = std::pin::pin!(fut);
                let finished = tokio::select! {
                    biased;
                    _ = &mut fut => true,
                    _ = abandon.cancelled() => false,
                };
                active.fetch_sub(1, Ordering::SeqCst);

                if finished {
                    total_completed.fetch_add(1, Ordering::SeqCst);
                } else {
                    warn!("Abandoned work still running at shutdown");
                }
                drop(permit);
            }
            .instrument(span),
        );

        Ok(())
    }

    /// Stop accepting work and wait up to `grace` for submitted work to
    /// finish. Whatever is still running afterwards is abandoned.
    ///
    /// Returns `true` if everything drained within the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, grace_secs = grace.as_secs_f64(), "Draining worker pool");
        }

        let drained = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();

        if !drained {
            warn!(
                remaining = self.tracker.len(),
                "Worker pool did not drain in time, abandoning remaining work"
            );
            self.abandon.cancel();
        }

        info!(drained, completed = self.total_completed(), "Worker pool stopped");
        drained
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
