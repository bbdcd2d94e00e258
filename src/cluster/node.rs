//! Simulated Node
//!
//! A node handle implementing the membership protocol on top of a shared
//! [`ClusterContext`].
//!
//! Joining inserts the node into the registry, which queues a NodeAdded event
//! on every peer's mailbox. Each joined node owns a delivery task that drains
//! its mailbox in order and hands every event to the worker pool, so a node
//! sees membership changes in global order while different nodes are served
//! independently. Leaving purges the node's registrations first, then removes
//! it from the registry (queueing NodeRemoved for the remaining peers).

use crate::cluster::registry::{MembershipEvent, NodeId};
use crate::cluster::worker::execute_blocking;
use crate::cluster::ClusterContext;
use crate::domain::{ClusterManager, NodeInfo, NodeListener};
use crate::error::{Error, Result};
use crate::primitives::{Counter, LockGuard, SharedMap};
use crate::registration::{RegistrationInfo, RegistrationWatch};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

#[derive(Default)]
struct LocalState {
    node_id: Option<NodeId>,
    listener: Option<Arc<dyn NodeListener>>,
}

struct NodeInner {
    ctx: Arc<ClusterContext>,
    state: Mutex<LocalState>,
    /// Serializes listener callbacks with join/leave of this handle
    delivery_gate: Mutex<()>,
}

impl NodeInner {
    fn do_join(self: &Arc<Self>, runtime: tokio::runtime::Handle) -> Result<NodeId> {
        let _gate = self.delivery_gate.lock();
        let mut state = self.state.lock();

        if let Some(node_id) = &state.node_id {
            return Err(Error::AlreadyActive {
                node_id: node_id.to_string(),
            });
        }

        let node_id = NodeId::random();
        let (mailbox, events) = mpsc::unbounded_channel();
        let peers = self.ctx.registry().insert(node_id.clone(), mailbox)?;
        state.node_id = Some(node_id.clone());
        drop(state);

        runtime.spawn(deliver_events(
            Arc::downgrade(self),
            Arc::clone(&self.ctx),
            node_id.clone(),
            events,
        ));

        info!(node_id = %node_id, peers, "Node joined cluster");
        Ok(node_id)
    }

    fn do_leave(&self) -> Result<()> {
        let _gate = self.delivery_gate.lock();
        let mut state = self.state.lock();

        let Some(node_id) = state.node_id.clone() else {
            debug!("Leave requested by inactive node");
            return Ok(());
        };

        self.ctx.remove_node_info(&node_id);
        self.ctx.registry().remove(&node_id);
        state.node_id = None;
        state.listener = None;

        info!(node_id = %node_id, "Node left cluster");
        Ok(())
    }

    /// Hand `event` to the listener if this handle is still `incarnation`
    fn deliver(&self, incarnation: &NodeId, event: &MembershipEvent) -> bool {
        let _gate = self.delivery_gate.lock();
        let listener = {
            let state = self.state.lock();
            if state.node_id.as_ref() != Some(incarnation) {
                return false;
            }
            state.listener.clone()
        };

        let Some(listener) = listener else {
            return false;
        };

        match event {
            MembershipEvent::NodeAdded { node_id, .. } => listener.node_added(node_id),
            MembershipEvent::NodeRemoved { node_id, .. } => listener.node_left(node_id),
        }
        true
    }
}

/// Drain one node's mailbox, one pool task per event, in arrival order
async fn deliver_events(
    node: Weak<NodeInner>,
    ctx: Arc<ClusterContext>,
    incarnation: NodeId,
    mut events: mpsc::UnboundedReceiver<MembershipEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = node.upgrade() else {
            break;
        };

        let target = incarnation.clone();
        let change = event.change();
        let subject = event.node_id().clone();
        let result = ctx
            .workers()
            .run(move || inner.deliver(&target, &event))
            .await;

        match result {
            Ok(true) => {
                debug!(node_id = %incarnation, subject = %subject, %change, "Membership event delivered")
            }
            Ok(false) => {}
            Err(e) => {
                ctx.registry().record_listener_failure();
                error!(
                    node_id = %incarnation,
                    subject = %subject,
                    %change,
                    error = %e,
                    "Membership listener failed"
                );
            }
        }
    }

    debug!(node_id = %incarnation, "Membership mailbox closed");
}

// =============================================================================
// Simulated Node
// =============================================================================

/// Handle for one simulated cluster member
///
/// Clones refer to the same node.
#[derive(Clone)]
pub struct SimulatedNode {
    inner: Arc<NodeInner>,
}

impl std::fmt::Debug for SimulatedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedNode")
            .field("node_id", &self.node_id())
            .finish()
    }
}

impl SimulatedNode {
    /// Create an inactive node handle bound to `ctx`
    pub fn new(ctx: Arc<ClusterContext>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                ctx,
                state: Mutex::new(LocalState::default()),
                delivery_gate: Mutex::new(()),
            }),
        }
    }

    /// The cluster this node belongs to
    pub fn context(&self) -> &Arc<ClusterContext> {
        &self.inner.ctx
    }

    /// Join the cluster under a fresh random ID
    pub async fn join(&self) -> Result<NodeId> {
        let runtime = tokio::runtime::Handle::current();
        let inner = Arc::clone(&self.inner);
        execute_blocking(move || inner.do_join(runtime)).await
    }

    /// Leave the cluster. Succeeds without doing anything when not joined.
    pub async fn leave(&self) -> Result<()> {
        if let Some(node_id) = self.node_id() {
            let purged = self.inner.ctx.registrations().remove_node(&node_id);
            debug!(node_id = %node_id, purged, "Registrations of leaving node removed");
        }

        let inner = Arc::clone(&self.inner);
        execute_blocking(move || inner.do_leave()).await
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().node_id.is_some()
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.inner.state.lock().node_id.clone()
    }

    /// IDs of all current members in join order
    pub fn get_nodes(&self) -> Vec<NodeId> {
        self.inner.ctx.get_nodes()
    }

    /// Install the membership listener, replacing any previous one
    pub fn set_node_listener(&self, listener: Arc<dyn NodeListener>) {
        self.inner.state.lock().listener = Some(listener);
    }

    /// Publish this node's connection details
    pub async fn set_node_info(&self, info: NodeInfo) -> Result<()> {
        let node_id = self.node_id().ok_or(Error::NotActive)?;
        self.inner.ctx.put_node_info(node_id, info);
        Ok(())
    }

    /// This node's published details
    pub fn node_info(&self) -> Option<NodeInfo> {
        self.node_id().and_then(|id| self.inner.ctx.node_info(&id))
    }

    /// Published details of `node_id`
    pub async fn get_node_info(&self, node_id: &NodeId) -> Result<NodeInfo> {
        self.inner
            .ctx
            .node_info(node_id)
            .ok_or_else(|| Error::NotAMember {
                node_id: node_id.to_string(),
            })
    }

    pub async fn register(&self, address: &str, info: RegistrationInfo) -> Result<()> {
        self.inner.ctx.registrations().register(address, info);
        Ok(())
    }

    pub async fn unregister(&self, address: &str, info: &RegistrationInfo) -> Result<()> {
        self.inner.ctx.registrations().unregister(address, info)
    }

    /// Watch the registrations under `address`; call `start()` to begin polling
    pub fn watch_registrations(&self, address: &str) -> RegistrationWatch {
        self.inner.ctx.watch_registrations(address)
    }

    pub fn get_counter(&self, name: &str) -> Counter {
        self.inner.ctx.primitives().counter(name)
    }

    pub fn get_async_map(&self, name: &str) -> SharedMap {
        self.inner.ctx.primitives().async_map(name)
    }

    pub fn get_sync_map(&self, name: &str) -> SharedMap {
        self.inner.ctx.primitives().sync_map(name)
    }

    pub async fn get_lock_with_timeout(&self, name: &str, timeout: Duration) -> Result<LockGuard> {
        self.inner.ctx.primitives().lock(name, timeout).await
    }

    /// Acquire `name` with the cluster's default lock timeout
    pub async fn get_lock(&self, name: &str) -> Result<LockGuard> {
        let timeout = self.inner.ctx.config().lock_timeout;
        self.get_lock_with_timeout(name, timeout).await
    }
}

#[async_trait]
impl ClusterManager for SimulatedNode {
    async fn join(&self) -> Result<NodeId> {
        SimulatedNode::join(self).await
    }

    async fn leave(&self) -> Result<()> {
        SimulatedNode::leave(self).await
    }

    fn is_active(&self) -> bool {
        SimulatedNode::is_active(self)
    }

    fn node_id(&self) -> Option<NodeId> {
        SimulatedNode::node_id(self)
    }

    fn get_nodes(&self) -> Vec<NodeId> {
        SimulatedNode::get_nodes(self)
    }

    fn set_node_listener(&self, listener: Arc<dyn NodeListener>) {
        SimulatedNode::set_node_listener(self, listener)
    }

    async fn set_node_info(&self, info: NodeInfo) -> Result<()> {
        SimulatedNode::set_node_info(self, info).await
    }

    fn node_info(&self) -> Option<NodeInfo> {
        SimulatedNode::node_info(self)
    }

    async fn get_node_info(&self, node_id: &NodeId) -> Result<NodeInfo> {
        SimulatedNode::get_node_info(self, node_id).await
    }

    async fn register(&self, address: &str, info: RegistrationInfo) -> Result<()> {
        SimulatedNode::register(self, address, info).await
    }

    async fn unregister(&self, address: &str, info: &RegistrationInfo) -> Result<()> {
        SimulatedNode::unregister(self, address, info).await
    }

    async fn registration_listener(&self, address: &str) -> Result<RegistrationWatch> {
        Ok(self.watch_registrations(address))
    }

    async fn get_counter(&self, name: &str) -> Result<Counter> {
        Ok(SimulatedNode::get_counter(self, name))
    }

    async fn get_async_map(&self, name: &str) -> Result<SharedMap> {
        Ok(SimulatedNode::get_async_map(self, name))
    }

    fn get_sync_map(&self, name: &str) -> SharedMap {
        SimulatedNode::get_sync_map(self, name)
    }

    async fn get_lock_with_timeout(&self, name: &str, timeout: Duration) -> Result<LockGuard> {
        SimulatedNode::get_lock_with_timeout(self, name, timeout).await
    }
}
