//! Simulated Cluster Manager
//!
//! An in-process stand-in for a multi-node cluster coordination service.
//! Any number of simulated nodes share one [`ClusterContext`]; they join and
//! leave, observe each other's membership changes, publish connection details,
//! register service endpoints under addresses and watch those addresses for
//! changes, all without a network.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                     SimulatedNode (ClusterManager port)                      │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │   Membership    │  │  Registrations  │  │     Shared Primitives       │  │
//! │  │ join / leave    │  │ register / watch│  │  counter / map / lock       │  │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────┬───────────────┘  │
//! │           │                    │                         │                   │
//! │           └────────────────────┼─────────────────────────┘                   │
//! │                                │                                             │
//! │                    ┌───────────┴───────────┐                                │
//! │                    │    ClusterContext     │                                │
//! │                    │ (registry, store, …)  │                                │
//! │                    └───────────┬───────────┘                                │
//! ├────────────────────────────────┼────────────────────────────────────────────┤
//! │                    ┌───────────┴───────────┐                                │
//! │                    │      WorkerPool       │                                │
//! │                    │ listeners, watch ticks│                                │
//! │                    └───────────────────────┘                                │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cluster`]: Shared context, node registry, membership protocol, workers
//! - [`registration`]: Address registrations and change watches
//! - [`primitives`]: Name-keyed counters, maps and locks
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling

pub mod cluster;
pub mod domain;
pub mod error;
pub mod primitives;
pub mod registration;

// Re-export commonly used types
pub use cluster::{
    ClusterConfig, ClusterContext, ClusterStats, MembershipChange, MembershipEvent, NodeId,
    ResetSummary, SimulatedNode,
};

pub use domain::{ClusterManager, ClusterManagerRef, NodeInfo, NodeListener, NodeListenerFn};

pub use error::{Error, Result};

pub use primitives::{Counter, LockGuard, SharedMap};

pub use registration::{RegistrationInfo, RegistrationSnapshot, RegistrationWatch, WatchPhase};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
