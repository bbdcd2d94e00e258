//! Shared Counter

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Cluster-wide counter; clones share the same value
#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicI64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    pub fn get_and_increment(&self) -> i64 {
        self.get_and_add(1)
    }

    pub fn decrement_and_get(&self) -> i64 {
        self.add_and_get(-1)
    }

    pub fn add_and_get(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::SeqCst) + delta
    }

    pub fn get_and_add(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::SeqCst)
    }

    /// Set to `new` if the current value is `expected`
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
