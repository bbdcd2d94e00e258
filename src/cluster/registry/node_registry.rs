//! Join-Ordered Node Registry
//!
//! The ledger of simulated nodes that are currently members of the cluster.
//! Every mutation happens inside a single critical section, and membership
//! events are queued onto the other nodes' mailboxes inside that same section
//! so each receiver observes changes in global order.

use super::MembershipEvent;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

// =============================================================================
// Constants
// =============================================================================

/// Default capacity of the observer broadcast channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// Node ID
// =============================================================================

/// Unique identifier for a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generate a fresh random identifier
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&String> for NodeId {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

// =============================================================================
// Node Entry
// =============================================================================

/// Sending half of a node's membership mailbox
pub type Mailbox = mpsc::UnboundedSender<MembershipEvent>;

/// Entry for a single node in the registry
#[derive(Debug, Clone)]
pub struct NodeEntry {
    /// Node ID
    pub node_id: NodeId,
    /// Join timestamp
    pub joined_at: DateTime<Utc>,
    /// Where membership events for this node are queued
    mailbox: Mailbox,
}

impl NodeEntry {
    fn new(node_id: NodeId, mailbox: Mailbox) -> Self {
        Self {
            node_id,
            joined_at: Utc::now(),
            mailbox,
        }
    }

    /// Queue an event for this node; false if its delivery task is gone
    fn enqueue(&self, event: MembershipEvent) -> bool {
        self.mailbox.send(event).is_ok()
    }
}

// =============================================================================
// Registry Statistics
// =============================================================================

/// Counters maintained by the registry
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Successful joins
    pub joins: AtomicU64,
    /// Successful leaves
    pub leaves: AtomicU64,
    /// Events queued onto node mailboxes
    pub notifications_queued: AtomicU64,
    /// Events that could not be queued (mailbox closed)
    pub notifications_dropped: AtomicU64,
    /// Listener invocations that panicked or failed
    pub listener_failures: AtomicU64,
}

impl RegistryStats {
    /// Create a snapshot of current stats
    pub fn snapshot(&self) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            joins: self.joins.load(Ordering::Relaxed),
            leaves: self.leaves.load(Ordering::Relaxed),
            notifications_queued: self.notifications_queued.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStatsSnapshot {
    pub joins: u64,
    pub leaves: u64,
    pub notifications_queued: u64,
    pub notifications_dropped: u64,
    pub listener_failures: u64,
}

// =============================================================================
// Node Registry
// =============================================================================

/// Ordered registry of active nodes, shared by the whole simulated cluster
pub struct NodeRegistry {
    /// Active nodes in join order
    nodes: Mutex<IndexMap<NodeId, NodeEntry>>,
    /// Statistics
    stats: RegistryStats,
    /// Event broadcaster for observers
    event_sender: broadcast::Sender<MembershipEvent>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("node_count", &self.len())
            .finish()
    }
}

impl NodeRegistry {
    /// Create a new node registry
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// Create a registry whose observer channel buffers `capacity` events
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (event_sender, _) = broadcast::channel(capacity.max(1));
        Self {
            nodes: Mutex::new(IndexMap::new()),
            stats: RegistryStats::default(),
            event_sender,
        }
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.event_sender.subscribe()
    }

    /// Add a node and queue a NodeAdded event for every other member.
    ///
    /// Returns the number of peers the event was queued for.
    pub fn insert(&self, node_id: NodeId, mailbox: Mailbox) -> Result<usize> {
        let event = MembershipEvent::added(node_id.clone());

        let notified = {
            let mut nodes = self.nodes.lock();
            if nodes.contains_key(&node_id) {
                return Err(Error::NodeAlreadyRegistered {
                    node_id: node_id.to_string(),
                });
            }
            nodes.insert(node_id.clone(), NodeEntry::new(node_id.clone(), mailbox));
            self.fan_out(&nodes, &node_id, &event)
        };

        self.stats.joins.fetch_add(1, Ordering::Relaxed);
        let _ = self.event_sender.send(event);

        debug!(node_id = %node_id, peers = notified, "Node inserted into registry");
        Ok(notified)
    }

    /// Remove a node and queue a NodeRemoved event for every remaining member
    pub fn remove(&self, node_id: &NodeId) -> Option<NodeEntry> {
        let event = MembershipEvent::removed(node_id.clone());

        let (removed, notified) = {
            let mut nodes = self.nodes.lock();
            match nodes.shift_remove(node_id) {
                Some(entry) => {
                    let notified = self.fan_out(&nodes, node_id, &event);
                    (entry, notified)
                }
                None => return None,
            }
        };

        self.stats.leaves.fetch_add(1, Ordering::Relaxed);
        let _ = self.event_sender.send(event);

        debug!(node_id = %node_id, peers = notified, "Node removed from registry");
        Some(removed)
    }

    /// Queue `event` for every node except `origin`. Caller holds the lock.
    fn fan_out(
        &self,
        nodes: &IndexMap<NodeId, NodeEntry>,
        origin: &NodeId,
        event: &MembershipEvent,
    ) -> usize {
        let mut queued = 0;
        for entry in nodes.values().filter(|e| &e.node_id != origin) {
            if entry.enqueue(event.clone()) {
                queued += 1;
            } else {
                self.stats.notifications_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(node_id = %entry.node_id, "Mailbox closed, membership event dropped");
            }
        }
        self.stats
            .notifications_queued
            .fetch_add(queued as u64, Ordering::Relaxed);
        queued
    }

    /// Get a node by ID
    pub fn get(&self, node_id: &NodeId) -> Option<NodeEntry> {
        self.nodes.lock().get(node_id).cloned()
    }

    /// Check if a node exists
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.lock().contains_key(node_id)
    }

    /// Snapshot of all node IDs in join order
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.lock().keys().cloned().collect()
    }

    /// Number of active nodes
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every node without announcing anything. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut nodes = self.nodes.lock();
        let count = nodes.len();
        nodes.clear();
        count
    }

    /// Record a failed listener invocation
    pub fn record_listener_failure(&self) {
        self.stats.listener_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get statistics
    pub fn stats(&self) -> RegistryStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
