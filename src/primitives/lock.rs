//! Shared Locks
//!
//! Exclusive, name-keyed locks with acquisition timeouts.

use crate::error::{Error, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Held lock; released on drop
#[derive(Debug)]
pub struct LockGuard {
    name: String,
    _permit: OwnedSemaphorePermit,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the lock now
    pub fn release(self) {
        debug!(lock = %self.name, "Lock released");
    }
}

/// Locks keyed by name
#[derive(Debug, Default)]
pub struct LocalLocks {
    locks: DashMap<String, Arc<Semaphore>>,
}

impl LocalLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `name`, waiting at most `timeout`
    pub async fn acquire(&self, name: &str, timeout: Duration) -> Result<LockGuard> {
        let semaphore = Arc::clone(
            self.locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .value(),
        );

        match tokio::time::timeout(timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => {
                debug!(lock = %name, "Lock acquired");
                Ok(LockGuard {
                    name: name.to_string(),
                    _permit: permit,
                })
            }
            Ok(Err(_)) => Err(Error::Internal(format!("lock {} was closed", name))),
            Err(_) => Err(Error::LockTimeout {
                name: name.to_string(),
                timeout,
            }),
        }
    }

    /// Forget every lock. Guards already handed out stay valid.
    pub fn clear(&self) {
        self.locks.clear();
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
