//! Background Execution
//!
//! A bounded pool for short blocking units of work (listener notifications,
//! registration watch ticks) plus the unbounded blocking executor used by
//! join and leave.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

// =============================================================================
// Worker Stats
// =============================================================================

/// Statistics for the worker pool
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Tasks handed to the pool
    pub submitted: AtomicU64,
    /// Tasks that returned normally
    pub completed: AtomicU64,
    /// Tasks that panicked
    pub panicked: AtomicU64,
}

/// Snapshot of worker statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub panicked: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Worker Pool
// =============================================================================

/// Bounded pool of blocking workers
///
/// At most `max_workers` tasks run at once; the rest wait for a permit.
/// A panicking task is reported as an error to its submitter only.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    max_workers: usize,
    stats: WorkerStats,
}

impl WorkerPool {
    /// Create a pool running at most `max_workers` tasks concurrently
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            stats: WorkerStats::default(),
        }
    }

    /// Run `task` on a blocking worker once a slot is free
    pub async fn run<F, R>(&self, task: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("worker pool closed".into()))?;
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        })
        .await;

        match result {
            Ok(value) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(e) => {
                if e.is_panic() {
                    self.stats.panicked.fetch_add(1, Ordering::Relaxed);
                }
                Err(join_error(e))
            }
        }
    }

    /// Maximum concurrent tasks
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Slots currently free
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Run a blocking unit of work off the calling task and report its completion
pub async fn execute_blocking<F, R>(task: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(join_error)?
}

fn join_error(e: JoinError) -> Error {
    if e.is_panic() {
        Error::Internal("background task panicked".into())
    } else {
        Error::Internal(format!("background task cancelled: {}", e))
    }
}
