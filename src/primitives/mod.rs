//! Shared Data Primitives
//!
//! Counters, maps and locks looked up by name. The first access to a name
//! creates the primitive; concurrent first accesses agree on a single
//! instance.

pub mod counter;
pub mod lock;
pub mod map;

pub use counter::Counter;
pub use lock::{LocalLocks, LockGuard};
pub use map::SharedMap;

use crate::error::Result;
use dashmap::DashMap;
use std::time::Duration;

/// All name-keyed primitives of one cluster
#[derive(Debug, Default)]
pub struct PrimitiveStores {
    counters: DashMap<String, Counter>,
    async_maps: DashMap<String, SharedMap>,
    sync_maps: DashMap<String, SharedMap>,
    locks: LocalLocks,
}

impl PrimitiveStores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for `name`, created at zero on first access
    pub fn counter(&self, name: &str) -> Counter {
        self.counters.entry(name.to_string()).or_insert_with(Default::default).value().clone()
    }

    /// Async map for `name`
    pub fn async_map(&self, name: &str) -> SharedMap {
        self.async_maps.entry(name.to_string()).or_insert_with(Default::default).value().clone()
    }

    /// Sync map for `name`
    pub fn sync_map(&self, name: &str) -> SharedMap {
        self.sync_maps.entry(name.to_string()).or_insert_with(Default::default).value().clone()
    }

    /// Acquire the lock `name`
    pub async fn lock(&self, name: &str, timeout: Duration) -> Result<LockGuard> {
        self.locks.acquire(name, timeout).await
    }

    /// Forget every counter, map and lock
    pub fn clear(&self) {
        self.counters.clear();
        self.async_maps.clear();
        self.sync_maps.clear();
        self.locks.clear();
    }

    /// Number of named primitives currently held
    pub fn len(&self) -> usize {
        self.counters.len() + self.async_maps.len() + self.sync_maps.len() + self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
