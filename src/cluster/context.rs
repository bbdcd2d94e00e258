//! Cluster Context
//!
//! Everything the simulated nodes of one cluster share: the node registry,
//! the registration store, published node infos, shared primitives and the
//! worker pool. Tests create one context per scenario and may wipe it with
//! [`ClusterContext::reset_all`].

use crate::cluster::registry::{NodeId, NodeRegistry, RegistryStatsSnapshot};
use crate::cluster::worker::{WorkerPool, WorkerStatsSnapshot};
use crate::cluster::{ClusterConfig, SimulatedNode};
use crate::domain::NodeInfo;
use crate::error::Result;
use crate::primitives::PrimitiveStores;
use crate::registration::{RegistrationStore, RegistrationWatch, StoreStatsSnapshot};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// What `reset_all` wiped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetSummary {
    pub nodes: usize,
    pub registrations: usize,
    pub node_infos: usize,
    pub primitives: usize,
}

/// Combined statistics of a cluster
#[derive(Debug, Clone)]
pub struct ClusterStats {
    pub registry: RegistryStatsSnapshot,
    pub registrations: StoreStatsSnapshot,
    pub workers: WorkerStatsSnapshot,
    pub active_nodes: usize,
}

/// Shared state of one simulated cluster
pub struct ClusterContext {
    config: ClusterConfig,
    registry: NodeRegistry,
    registrations: RegistrationStore,
    node_infos: DashMap<NodeId, NodeInfo>,
    primitives: PrimitiveStores,
    workers: WorkerPool,
}

impl std::fmt::Debug for ClusterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterContext")
            .field("nodes", &self.registry.len())
            .field("registrations", &self.registrations.len())
            .field("workers", &self.workers.max_workers())
            .finish()
    }
}

impl ClusterContext {
    /// Create a context with default configuration
    pub fn new() -> Arc<Self> {
        Self::build(ClusterConfig::default())
    }

    /// Create a context with custom configuration
    pub fn with_config(config: ClusterConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ClusterConfig) -> Arc<Self> {
        let context = Arc::new(Self {
            registry: NodeRegistry::with_event_capacity(config.event_channel_capacity),
            registrations: RegistrationStore::new(),
            node_infos: DashMap::new(),
            primitives: PrimitiveStores::new(),
            workers: WorkerPool::new(config.worker_threads),
            config,
        });
        info!(
            workers = context.workers.max_workers(),
            poll_interval_ms = context.config.poll_interval.as_millis() as u64,
            "Simulated cluster initialized"
        );
        context
    }

    /// Create a new, not yet joined node handle bound to this cluster
    pub fn create_node(self: &Arc<Self>) -> SimulatedNode {
        SimulatedNode::new(Arc::clone(self))
    }

    /// Watch the registrations under `address`
    pub fn watch_registrations(self: &Arc<Self>, address: &str) -> RegistrationWatch {
        RegistrationWatch::new(Arc::clone(self), address)
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn registrations(&self) -> &RegistrationStore {
        &self.registrations
    }

    pub fn primitives(&self) -> &PrimitiveStores {
        &self.primitives
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// IDs of the active nodes in join order
    pub fn get_nodes(&self) -> Vec<NodeId> {
        self.registry.node_ids()
    }

    /// Published info of `node_id`
    pub fn node_info(&self, node_id: &NodeId) -> Option<NodeInfo> {
        self.node_infos.get(node_id).map(|i| i.value().clone())
    }

    pub(crate) fn put_node_info(&self, node_id: NodeId, info: NodeInfo) {
        self.node_infos.insert(node_id, info);
    }

    pub(crate) fn remove_node_info(&self, node_id: &NodeId) -> Option<NodeInfo> {
        self.node_infos.remove(node_id).map(|(_, info)| info)
    }

    /// Wipe nodes, registrations, node infos and primitives.
    ///
    /// Nothing is announced to listeners. Handles that were joined keep their
    /// local ID until they leave.
    pub fn reset_all(&self) -> ResetSummary {
        let summary = ResetSummary {
            nodes: self.registry.clear(),
            registrations: self.registrations.len(),
            node_infos: self.node_infos.len(),
            primitives: self.primitives.len(),
        };

        self.registrations.clear();
        self.node_infos.clear();
        self.primitives.clear();

        info!(
            nodes = summary.nodes,
            registrations = summary.registrations,
            node_infos = summary.node_infos,
            primitives = summary.primitives,
            "Cluster state reset"
        );
        summary
    }

    pub fn stats(&self) -> ClusterStats {
        ClusterStats {
            registry: self.registry.stats(),
            registrations: self.registrations.stats(),
            workers: self.workers.stats(),
            active_nodes: self.registry.len(),
        }
    }
}
