//! Simulated cluster
//!
//! Shared cluster state, the membership protocol and the machinery that runs
//! listener callbacks and watch polls in the background.

pub mod config;
pub mod context;
pub mod node;
pub mod registry;
pub mod worker;

pub use config::{ClusterConfig, DEFAULT_LOCK_TIMEOUT, DEFAULT_POLL_INTERVAL};
pub use context::{ClusterContext, ClusterStats, ResetSummary};
pub use node::SimulatedNode;
pub use registry::{
    MembershipChange, MembershipEvent, NodeId, NodeRegistry, RegistryStatsSnapshot,
};
pub use worker::{execute_blocking, WorkerPool, WorkerStatsSnapshot};
