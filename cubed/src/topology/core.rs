//! Topology actor - sole owner of the node map

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::TopologyConfig;
use super::messages::{
    CreateNodeRequest, DispatchOutcome, InitReport, ManagerState, NodeCreated, SweepReport, TopologyCommand,
    TopologyError, TopologyMetrics, TopologyResponse,
};
use super::monitor::run_monitor;
use super::queue::{TaskReceiver, run_consumer};
use crate::domain::{
    FIXED_TOPOLOGY, Node, NodeId, NodeSnapshot, NodeStatus, Payload, ProcessOutcome, Role, TaskItem, TopologyView,
};
use crate::handlers::HandlerRegistry;
use crate::hub::BroadcastHub;

/// Target id used for topology-wide pushes
pub const TOPOLOGY_TARGET: &str = "cube";

/// State owned by the actor task
pub(crate) struct Topology {
    config: TopologyConfig,
    nodes: BTreeMap<NodeId, Node>,
    handlers: HandlerRegistry,
    hub: BroadcastHub,
    state_tx: watch::Sender<ManagerState>,
    shutdown_tx: watch::Sender<bool>,
    metrics: TopologyMetrics,
}

impl Topology {
    pub(crate) fn new(
        config: TopologyConfig,
        handlers: HandlerRegistry,
        hub: BroadcastHub,
        state_tx: watch::Sender<ManagerState>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            nodes: BTreeMap::new(),
            handlers,
            hub,
            state_tx,
            shutdown_tx,
            metrics: TopologyMetrics::default(),
        }
    }

    fn state(&self) -> ManagerState {
        *self.state_tx.borrow()
    }

    fn require_running(&self) -> TopologyResponse<()> {
        match self.state() {
            ManagerState::Running => Ok(()),
            state => Err(TopologyError::ManagerNotReady(state)),
        }
    }

    /// Process commands until shutdown
    ///
    /// The actor keeps only a weak handle to its own channel, so it also stops
    /// once every manager handle and background loop is gone.
    pub(crate) async fn run(
        mut self,
        mut rx: mpsc::Receiver<TopologyCommand>,
        self_tx: mpsc::WeakSender<TopologyCommand>,
        tasks: TaskReceiver,
    ) {
        let mut tasks = Some(tasks);
        let mut loops: Vec<JoinHandle<()>> = Vec::new();

        info!("Topology manager started");

        while let Some(command) = rx.recv().await {
            match command {
                TopologyCommand::Initialize { reply } => {
                    let result = match self.initialize().await {
                        Ok(report) => match (tasks.take(), self_tx.upgrade()) {
                            (Some(tasks), Some(tx)) => {
                                loops = self.spawn_loops(tasks, tx);
                                self.state_tx.send_replace(ManagerState::Running);
                                info!(nodes = self.nodes.len(), "Topology manager running");
                                Ok(report)
                            }
                            _ => {
                                error!("Topology manager cannot start background loops");
                                self.state_tx.send_replace(ManagerState::Stopped);
                                Err(TopologyError::ChannelError)
                            }
                        },
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(result);
                }

                TopologyCommand::CreateNode { request, reply } => {
                    let _ = reply.send(self.create_node(request).await);
                }

                TopologyCommand::Reinitialize { id, reply } => {
                    let _ = reply.send(self.reinitialize(&id).await);
                }

                TopologyCommand::NodeStatus { id, reply } => {
                    let result = self.require_running().and_then(|_| {
                        self.nodes
                            .get(&id)
                            .map(Node::status_snapshot)
                            .ok_or(TopologyError::NodeNotFound(id))
                    });
                    let _ = reply.send(result);
                }

                TopologyCommand::ListNodes { reply } => {
                    let result = self
                        .require_running()
                        .map(|_| self.nodes.values().map(Node::status_snapshot).collect());
                    let _ = reply.send(result);
                }

                TopologyCommand::GetMetrics { reply } => {
                    let mut metrics = self.metrics.clone();
                    metrics.nodes = self.nodes.len();
                    let _ = reply.send(metrics);
                }

                TopologyCommand::Dispatch { item, reply } => {
                    let _ = reply.send(self.dispatch(item).await);
                }

                TopologyCommand::RefreshDependencies { reply } => {
                    let _ = reply.send(self.refresh_dependencies().await);
                }

                TopologyCommand::Shutdown { reply } => {
                    info!("Topology manager shutting down");
                    self.state_tx.send_replace(ManagerState::Stopped);
                    self.shutdown_tx.send_replace(true);
                    let _ = reply.send(std::mem::take(&mut loops));
                    break;
                }
            }
        }

        info!("Topology manager stopped");
    }

    fn spawn_loops(&self, tasks: TaskReceiver, tx: mpsc::Sender<TopologyCommand>) -> Vec<JoinHandle<()>> {
        debug!("Topology::spawn_loops: called");
        let consumer = tokio::spawn(run_consumer(
            tasks,
            tx.clone(),
            self.config.queue.pacing(),
            self.shutdown_tx.subscribe(),
        ));
        let monitor = tokio::spawn(run_monitor(
            tx,
            self.config.dependencies.interval(),
            self.shutdown_tx.subscribe(),
        ));
        vec![consumer, monitor]
    }

    /// Create and initialize the nine fixed nodes, in order
    ///
    /// A node that fails to initialize stays in the map with status `error`
    /// and the remaining nodes are still brought up.
    async fn initialize(&mut self) -> TopologyResponse<InitReport> {
        debug!("Topology::initialize: called");
        match self.state() {
            ManagerState::Uninitialized => {}
            ManagerState::Stopped => return Err(TopologyError::ManagerNotReady(ManagerState::Stopped)),
            _ => return Err(TopologyError::AlreadyInitialized),
        }
        self.state_tx.send_replace(ManagerState::Initializing);

        let mut report = InitReport { nodes: Vec::new() };
        for (index, (name, role)) in FIXED_TOPOLOGY.iter().enumerate() {
            let id = NodeId::Index(index as u32 + 1);
            let mut node = Node::new(id.clone(), *name, *role, Payload::new());
            let handler = self.handlers.get(*role);

            let result = node.initialize(handler.as_deref()).await;
            if node.status() == NodeStatus::Error {
                warn!(node = %id, name, error = ?result.err(), "Fixed node failed to initialize, continuing");
            }

            report.nodes.push(node.status_snapshot());
            self.nodes.insert(id, node);
        }

        let failed = report.failed().len();
        info!(nodes = report.nodes.len(), failed, "Fixed topology initialized");

        self.publish_topology("topology_update").await;
        Ok(report)
    }

    async fn create_node(&mut self, request: CreateNodeRequest) -> TopologyResponse<NodeCreated> {
        debug!(id = ?request.id, name = ?request.name, kind = ?request.kind, "Topology::create_node: called");
        self.require_running()?;

        if self.nodes.len() >= self.config.max_nodes {
            return Err(TopologyError::CreationFailed(format!(
                "topology is full ({} nodes)",
                self.config.max_nodes
            )));
        }

        // Only the initializer creates fixed nodes
        let id = request.id.map(NodeId::canonical).unwrap_or_else(NodeId::generate);
        if matches!(&id, NodeId::Named(name) if name.is_empty()) {
            return Err(TopologyError::CreationFailed("id must not be empty".to_string()));
        }
        if self.nodes.contains_key(&id) {
            return Err(TopologyError::CreationFailed(format!("node {} already exists", id)));
        }

        let name = match request.name {
            Some(name) if name.trim().is_empty() => {
                return Err(TopologyError::CreationFailed("name must not be empty".to_string()));
            }
            Some(name) => name,
            None => id.to_string(),
        };

        let role = request
            .kind
            .as_deref()
            .and_then(|kind| kind.parse::<Role>().ok())
            .unwrap_or(self.config.default_role);

        let mut node = Node::new(id.clone(), name, role, request.config);
        let handler = self.handlers.get(role);
        if let Err(e) = node.initialize(handler.as_deref()).await {
            warn!(node = %id, error = %e, "Ad hoc node failed to initialize");
        }

        let created = NodeCreated {
            node_id: id.clone(),
            name: node.name().to_string(),
            role,
            status: node.status(),
            created_at: node.created_at(),
        };
        info!(node = %id, name = %created.name, role = %role, status = %created.status, "Node created");

        let snapshot = node.status_snapshot();
        self.nodes.insert(id.clone(), node);
        self.publish_node("node_created", &id, snapshot).await;
        Ok(created)
    }

    async fn reinitialize(&mut self, id: &NodeId) -> TopologyResponse<NodeSnapshot> {
        debug!(node = %id, "Topology::reinitialize: called");
        self.require_running()?;

        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| TopologyError::NodeNotFound(id.clone()))?;
        node.reset()?;

        let handler = self.handlers.get(node.role());
        if let Err(e) = node.initialize(handler.as_deref()).await {
            warn!(node = %id, error = %e, "Node failed to reinitialize");
        }

        let snapshot = node.status_snapshot();
        self.publish_node("node_update", id, snapshot.clone()).await;
        Ok(snapshot)
    }

    /// Deliver one task item to its target node
    async fn dispatch(&mut self, item: TaskItem) -> DispatchOutcome {
        debug!(sequence = item.sequence, target = %item.target, "Topology::dispatch: called");

        let Some(node) = self.nodes.get_mut(&item.target) else {
            let err = TopologyError::UnknownTargetDeferred(item.target.clone());
            warn!(sequence = item.sequence, error = %err, "Dropping task");
            self.metrics.dropped += 1;
            return DispatchOutcome::Dropped;
        };

        let handler = self.handlers.get(node.role());
        let outcome = match node.process(handler.as_deref(), &item.payload).await {
            Ok(ProcessOutcome::Handled) => {
                self.metrics.processed += 1;
                DispatchOutcome::Processed
            }
            Ok(ProcessOutcome::NoHandler) => {
                self.metrics.no_handler += 1;
                DispatchOutcome::NoHandler
            }
            Ok(ProcessOutcome::Skipped(status)) => {
                debug!(sequence = item.sequence, target = %item.target, %status, "Topology::dispatch: node not active");
                self.metrics.skipped += 1;
                DispatchOutcome::Skipped(status)
            }
            Err(e) => {
                error!(sequence = item.sequence, target = %item.target, error = %e, "Task processing failed");
                self.metrics.failed += 1;
                DispatchOutcome::Failed(e.to_string())
            }
        };

        let snapshot = node.status_snapshot();
        self.publish_node("node_update", &item.target, snapshot).await;
        outcome
    }

    /// Recompute every node's dependency set against the current topology
    async fn refresh_dependencies(&mut self) -> SweepReport {
        debug!(nodes = self.nodes.len(), "Topology::refresh_dependencies: called");
        let view = TopologyView::from_nodes(self.nodes.values());
        let policy = self.config.dependencies.policy();

        self.metrics.sweeps += 1;
        let mut report = SweepReport {
            sweep: self.metrics.sweeps,
            ..Default::default()
        };

        for (id, node) in self.nodes.iter_mut() {
            match node.refresh_dependencies(&view, policy) {
                Ok(changed) => {
                    report.refreshed += 1;
                    if changed {
                        report.changed.push(id.clone());
                    }
                }
                Err(e) => {
                    warn!(node = %id, error = %e, "Dependency refresh failed");
                    report.failures.push((id.clone(), e.to_string()));
                }
            }
        }
        self.metrics.refresh_failures += report.failures.len() as u64;

        self.publish_topology("topology_update").await;
        report
    }

    async fn publish_node(&self, kind: &str, id: &NodeId, snapshot: NodeSnapshot) {
        match serde_json::to_value(snapshot) {
            Ok(data) => {
                self.hub.publish(kind, id.to_string(), data).await;
            }
            Err(e) => warn!(node = %id, error = %e, "Failed to serialize node snapshot"),
        }
    }

    async fn publish_topology(&self, kind: &str) {
        let nodes: Vec<NodeSnapshot> = self.nodes.values().map(Node::status_snapshot).collect();
        let data = match serde_json::to_value(&nodes) {
            Ok(nodes) => json!({ "nodes": nodes, "count": self.nodes.len() }),
            Err(e) => {
                warn!(error = %e, "Failed to serialize topology");
                Value::Null
            }
        };
        self.hub.publish(kind, TOPOLOGY_TARGET, data).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    use crate::topology::queue::TaskQueue;

    #[tokio::test]
    async fn test_initialize_fails_when_loops_cannot_start() {
        let (state_tx, state_rx) = watch::channel(ManagerState::Uninitialized);
        let topology = Topology::new(
            TopologyConfig::default(),
            HandlerRegistry::empty(),
            BroadcastHub::new(4),
            state_tx,
        );
        let (_queue, tasks) = TaskQueue::new(None);

        let (tx, rx) = mpsc::channel(4);
        let (reply, reply_rx) = oneshot::channel();
        tx.send(TopologyCommand::Initialize { reply }).await.unwrap();
        let weak = tx.downgrade();
        drop(tx);

        topology.run(rx, weak, tasks).await;

        let result = reply_rx.await.unwrap();
        assert!(matches!(result, Err(TopologyError::ChannelError)));
        assert_eq!(*state_rx.borrow(), ManagerState::Stopped);
    }
}
