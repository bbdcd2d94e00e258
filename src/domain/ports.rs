//! Domain Ports - Core trait definitions for the simulated cluster
//!
//! These traits define the boundary between cluster-aware code under test and
//! the cluster manager it runs on. `SimulatedNode` is the in-process adapter.

use crate::cluster::NodeId;
use crate::error::Result;
use crate::primitives::{Counter, LockGuard, SharedMap};
use crate::registration::{RegistrationInfo, RegistrationWatch};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Node Info
// =============================================================================

/// Connection details a node publishes to the rest of the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Host the node's event bus listens on
    pub host: String,
    /// Port the node's event bus listens on
    pub port: u16,
    /// Arbitrary application metadata
    pub metadata: Option<serde_json::Value>,
}

impl NodeInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            metadata: None,
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// =============================================================================
// Node Listener (Port)
// =============================================================================

/// Receives membership changes observed by one node
///
/// Callbacks run on a background worker, never on the thread that triggered
/// the change. A panicking callback is logged and does not affect delivery to
/// other nodes. A callback blocks its own node's `join()` and `leave()` until
/// it returns, so it must never wait on either of them.
pub trait NodeListener: Send + Sync {
    /// Another node joined the cluster
    fn node_added(&self, node_id: &NodeId);

    /// Another node left the cluster
    fn node_left(&self, node_id: &NodeId);
}

/// Closure-backed listener
pub struct NodeListenerFn<A, L> {
    on_added: A,
    on_left: L,
}

impl<A, L> NodeListenerFn<A, L>
where
    A: Fn(&NodeId) + Send + Sync,
    L: Fn(&NodeId) + Send + Sync,
{
    pub fn new(on_added: A, on_left: L) -> Self {
        Self { on_added, on_left }
    }
}

impl<A, L> NodeListener for NodeListenerFn<A, L>
where
    A: Fn(&NodeId) + Send + Sync,
    L: Fn(&NodeId) + Send + Sync,
{
    fn node_added(&self, node_id: &NodeId) {
        (self.on_added)(node_id)
    }

    fn node_left(&self, node_id: &NodeId) {
        (self.on_left)(node_id)
    }
}

// =============================================================================
// Cluster Manager (Port)
// =============================================================================

/// Node-facing surface of a cluster manager
#[async_trait]
pub trait ClusterManager: Send + Sync {
    /// Join the cluster, returning the assigned node ID
    async fn join(&self) -> Result<NodeId>;

    /// Leave the cluster. A no-op when not joined.
    async fn leave(&self) -> Result<()>;

    /// Whether this node is currently a member
    fn is_active(&self) -> bool;

    /// This node's ID while active
    fn node_id(&self) -> Option<NodeId>;

    /// IDs of all current members in join order
    fn get_nodes(&self) -> Vec<NodeId>;

    /// Install the membership listener, replacing any previous one
    fn set_node_listener(&self, listener: Arc<dyn NodeListener>);

    /// Publish this node's connection details
    async fn set_node_info(&self, info: NodeInfo) -> Result<()>;

    /// This node's published details, if any
    fn node_info(&self) -> Option<NodeInfo>;

    /// Look up the published details of any member
    async fn get_node_info(&self, node_id: &NodeId) -> Result<NodeInfo>;

    /// Add a registration under `address`
    async fn register(&self, address: &str, info: RegistrationInfo) -> Result<()>;

    /// Remove the first registration under `address` equal to `info`
    async fn unregister(&self, address: &str, info: &RegistrationInfo) -> Result<()>;

    /// Subscribe to changes of the registrations under `address`
    async fn registration_listener(&self, address: &str) -> Result<RegistrationWatch>;

    /// Shared counter for `name`
    async fn get_counter(&self, name: &str) -> Result<Counter>;

    /// Shared async map for `name`
    async fn get_async_map(&self, name: &str) -> Result<SharedMap>;

    /// Shared synchronous map for `name`
    fn get_sync_map(&self, name: &str) -> SharedMap;

    /// Acquire the shared lock `name`, failing after `timeout`
    async fn get_lock_with_timeout(&self, name: &str, timeout: Duration) -> Result<LockGuard>;
}

/// Type alias for Arc'd ClusterManager
pub type ClusterManagerRef = Arc<dyn ClusterManager>;

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_node_info_serde() {
        let info = NodeInfo::new("127.0.0.1", 5701).with_metadata(serde_json::json!({"zone": "a"}));
        let json = serde_json::to_string(&info).unwrap();
        let back: NodeInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn test_closure_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let added = Arc::clone(&seen);
        let left = Arc::clone(&seen);
        let listener = NodeListenerFn::new(
            move |id: &NodeId| added.lock().push(format!("+{id}")),
            move |id: &NodeId| left.lock().push(format!("-{id}")),
        );

        listener.node_added(&NodeId::new("a"));
        listener.node_left(&NodeId::new("a"));
        assert_eq!(*seen.lock(), vec!["+a".to_string(), "-a".to_string()]);
    }
}
