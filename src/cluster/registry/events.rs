//! Membership Events
//!
//! Events emitted by the node registry when simulated nodes join or leave.
//! The same values are queued onto node mailboxes for listener delivery and
//! broadcast to external observers.

use super::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events emitted by the node registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipEvent {
    /// A node joined the cluster
    NodeAdded {
        node_id: NodeId,
        at: DateTime<Utc>,
    },

    /// A node left the cluster
    NodeRemoved {
        node_id: NodeId,
        at: DateTime<Utc>,
    },
}

/// Kind of membership change, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipChange {
    Added,
    Removed,
}

impl std::fmt::Display for MembershipChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MembershipChange::Added => write!(f, "added"),
            MembershipChange::Removed => write!(f, "removed"),
        }
    }
}

impl MembershipEvent {
    /// Create a NodeAdded event stamped with the current time
    pub fn added(node_id: NodeId) -> Self {
        MembershipEvent::NodeAdded {
            node_id,
            at: Utc::now(),
        }
    }

    /// Create a NodeRemoved event stamped with the current time
    pub fn removed(node_id: NodeId) -> Self {
        MembershipEvent::NodeRemoved {
            node_id,
            at: Utc::now(),
        }
    }

    /// Get the node ID this event is about
    pub fn node_id(&self) -> &NodeId {
        match self {
            MembershipEvent::NodeAdded { node_id, .. } => node_id,
            MembershipEvent::NodeRemoved { node_id, .. } => node_id,
        }
    }

    /// Get the kind of change
    pub fn change(&self) -> MembershipChange {
        match self {
            MembershipEvent::NodeAdded { .. } => MembershipChange::Added,
            MembershipEvent::NodeRemoved { .. } => MembershipChange::Removed,
        }
    }

    /// Time at which the registry recorded the change
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MembershipEvent::NodeAdded { at, .. } | MembershipEvent::NodeRemoved { at, .. } => *at,
        }
    }
}
