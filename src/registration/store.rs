//! Registration Store
//!
//! Address → ordered list of registrations, shared by the whole cluster.
//! Each address has its own lock and no operation holds two of them at once.

use crate::cluster::NodeId;
use crate::error::{Error, Result};
use crate::registration::RegistrationInfo;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Point-in-time copy of one address's registrations, in registration order
pub type RegistrationSnapshot = Vec<RegistrationInfo>;

type AddressList = Arc<Mutex<Vec<RegistrationInfo>>>;

// =============================================================================
// Store Statistics
// =============================================================================

/// Counters maintained by the store
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Explicit registrations
    pub registered: AtomicU64,
    /// Explicit unregistrations
    pub unregistered: AtomicU64,
    /// Registrations removed because their node left
    pub purged: AtomicU64,
}

/// Snapshot of store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatsSnapshot {
    pub registered: u64,
    pub unregistered: u64,
    pub purged: u64,
}

impl StoreStats {
    pub fn snapshot(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Registration Store
// =============================================================================

/// Registrations keyed by address
#[derive(Debug, Default)]
pub struct RegistrationStore {
    addresses: DashMap<String, AddressList>,
    stats: StoreStats,
}

impl RegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the list for an address without keeping the map shard locked
    fn list(&self, address: &str) -> AddressList {
        if let Some(list) = self.addresses.get(address) {
            return Arc::clone(list.value());
        }
        Arc::clone(
            self.addresses
                .entry(address.to_string())
                .or_insert_with(Default::default)
                .value(),
        )
    }

    /// Append a registration to `address`
    pub fn register(&self, address: &str, info: RegistrationInfo) {
        debug!(address, registration = %info, "Registering");
        self.list(address).lock().push(info);
        self.stats.registered.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove the first registration under `address` equal to `info`
    pub fn unregister(&self, address: &str, info: &RegistrationInfo) -> Result<()> {
        let not_found = || Error::RegistrationNotFound {
            address: address.to_string(),
        };

        let list = self
            .addresses
            .get(address)
            .map(|l| Arc::clone(l.value()))
            .ok_or_else(not_found)?;

        let mut entries = list.lock();
        let pos = entries.iter().position(|e| e == info).ok_or_else(not_found)?;
        entries.remove(pos);
        drop(entries);

        self.stats.unregistered.fetch_add(1, Ordering::Relaxed);
        debug!(address, registration = %info, "Unregistered");
        Ok(())
    }

    /// Copy of the current registrations under `address`
    pub fn snapshot(&self, address: &str) -> RegistrationSnapshot {
        match self.addresses.get(address).map(|l| Arc::clone(l.value())) {
            Some(list) => list.lock().clone(),
            None => Vec::new(),
        }
    }

    /// Remove every registration owned by `node_id`, one address at a time.
    ///
    /// Returns the number of registrations removed.
    pub fn remove_node(&self, node_id: &NodeId) -> usize {
        let lists: Vec<(String, AddressList)> = self
            .addresses
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        let mut removed = 0;
        for (address, list) in lists {
            let mut entries = list.lock();
            let before = entries.len();
            entries.retain(|e| !e.is_owned_by(node_id));
            let count = before - entries.len();
            drop(entries);

            if count > 0 {
                debug!(address = %address, node_id = %node_id, count, "Purged registrations of departing node");
                removed += count;
            }
        }

        self.stats.purged.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Addresses that currently have at least one registration
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .addresses
            .iter()
            .filter(|e| !e.value().lock().is_empty())
            .map(|e| e.key().clone())
            .collect();
        addresses.sort();
        addresses
    }

    /// Total registrations across all addresses
    pub fn len(&self) -> usize {
        self.addresses.iter().map(|e| e.value().lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all registrations
    pub fn clear(&self) {
        self.addresses.clear();
    }

    pub fn stats(&self) -> StoreStatsSnapshot {
        self.stats.snapshot()
    }
}
