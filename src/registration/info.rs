//! Registration Records
//!
//! What a node publishes under an address: enough to route a message to a
//! consumer on that node.

use crate::cluster::NodeId;
use serde::{Deserialize, Serialize};

/// One registration of a consumer under an address
///
/// Records compare by value. The same value may be registered more than once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationInfo {
    /// Node owning the registration
    pub node_id: NodeId,
    /// Endpoint metadata (opaque to the cluster)
    pub endpoint: String,
    /// Consumer sequence number on the owning node
    pub seq: u64,
    /// Whether the consumer only accepts local deliveries
    pub local_only: bool,
}

impl RegistrationInfo {
    pub fn new(node_id: impl Into<NodeId>, endpoint: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            endpoint: endpoint.into(),
            seq: 0,
            local_only: false,
        }
    }

    /// Set the consumer sequence number
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    /// Mark as local-only
    pub fn local_only(mut self, local_only: bool) -> Self {
        self.local_only = local_only;
        self
    }

    /// Whether this registration belongs to `node_id`
    pub fn is_owned_by(&self, node_id: &NodeId) -> bool {
        &self.node_id == node_id
    }
}

impl std::fmt::Display for RegistrationInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}@{}", self.endpoint, self.seq, self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality() {
        let a = RegistrationInfo::new("node1", "v1");
        let b = RegistrationInfo::new("node1", "v1");
        assert_eq!(a, b);
        assert_ne!(a, b.clone().with_seq(1));
        assert_ne!(a, RegistrationInfo::new("node1", "v1").local_only(true));
    }

    #[test]
    fn test_ownership_and_display() {
        let info = RegistrationInfo::new("node1", "v1").with_seq(3);
        assert!(info.is_owned_by(&NodeId::new("node1")));
        assert!(!info.is_owned_by(&NodeId::new("node2")));
        assert_eq!(info.to_string(), "v1#3@node1");
    }
}
