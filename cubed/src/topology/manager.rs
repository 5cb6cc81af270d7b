//! TopologyManager - handle to the topology actor

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::config::TopologyConfig;
use super::core::Topology;
use super::messages::{
    CreateNodeRequest, InitReport, ManagerState, NodeCreated, TopologyCommand, TopologyError, TopologyMetrics,
    TopologyResponse,
};
use super::queue::TaskQueue;
use crate::domain::{NodeId, NodeSnapshot, Payload};
use crate::handlers::HandlerRegistry;
use crate::hub::BroadcastHub;

/// Handle for talking to the topology actor
///
/// All node state lives in the actor task; this handle only sends commands
/// and is cheap to clone.
#[derive(Debug, Clone)]
pub struct TopologyManager {
    tx: mpsc::Sender<TopologyCommand>,
    queue: TaskQueue,
    state: watch::Receiver<ManagerState>,
}

impl TopologyManager {
    /// Spawn the topology actor; the manager starts `uninitialized`
    pub fn spawn(config: TopologyConfig, handlers: HandlerRegistry, hub: BroadcastHub) -> Self {
        debug!(?handlers, "TopologyManager::spawn: called");
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let (queue, tasks) = TaskQueue::new(config.queue.capacity);
        let (state_tx, state_rx) = watch::channel(ManagerState::Uninitialized);

        let topology = Topology::new(config, handlers, hub, state_tx);
        tokio::spawn(topology.run(rx, tx.downgrade(), tasks));

        Self {
            tx,
            queue,
            state: state_rx,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ManagerState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ManagerState::Running
    }

    /// Items waiting in the task queue
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// Wait until the manager reaches `running` or stops
    pub async fn wait_running(&self) -> TopologyResponse<()> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| matches!(s, ManagerState::Running | ManagerState::Stopped))
            .await
            .map_err(|_| TopologyError::ChannelError)?;
        match *reached {
            ManagerState::Running => Ok(()),
            other => Err(TopologyError::ManagerNotReady(other)),
        }
    }

    /// Build the fixed nine-node topology and start the consumer and monitor loops
    pub async fn initialize(&self) -> TopologyResponse<InitReport> {
        debug!("TopologyManager::initialize: called");
        let (reply, rx) = oneshot::channel();
        self.send(TopologyCommand::Initialize { reply }).await?;
        let report = rx.await.map_err(|_| TopologyError::ChannelError)??;
        info!(nodes = report.nodes.len(), failed = report.failed().len(), "Topology initialized");
        Ok(report)
    }

    /// Append a payload for `node_id` to the task queue
    ///
    /// Returns the item's sequence number. The target is not checked here;
    /// an unknown target is dropped when the item is consumed.
    pub async fn submit(&self, node_id: impl Into<NodeId>, payload: Payload) -> TopologyResponse<u64> {
        let node_id = node_id.into();
        debug!(node = %node_id, "TopologyManager::submit: called");
        let state = self.state();
        if state != ManagerState::Running {
            return Err(TopologyError::ManagerNotReady(state));
        }
        self.queue
            .submit(node_id, payload)
            .await
            .map_err(|_| TopologyError::QueueClosed)
    }

    /// Snapshot of one node
    pub async fn node_status(&self, node_id: &NodeId) -> TopologyResponse<NodeSnapshot> {
        debug!(node = %node_id, "TopologyManager::node_status: called");
        let (reply, rx) = oneshot::channel();
        self.send(TopologyCommand::NodeStatus {
            id: node_id.clone(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| TopologyError::ChannelError)?
    }

    /// Snapshots of every node, fixed nodes first
    pub async fn list_nodes(&self) -> TopologyResponse<Vec<NodeSnapshot>> {
        debug!("TopologyManager::list_nodes: called");
        let (reply, rx) = oneshot::channel();
        self.send(TopologyCommand::ListNodes { reply }).await?;
        rx.await.map_err(|_| TopologyError::ChannelError)?
    }

    /// Create and initialize an ad hoc node
    pub async fn create_node(&self, request: CreateNodeRequest) -> TopologyResponse<NodeCreated> {
        debug!(id = ?request.id, name = ?request.name, "TopologyManager::create_node: called");
        let (reply, rx) = oneshot::channel();
        self.send(TopologyCommand::CreateNode { request, reply }).await?;
        rx.await.map_err(|_| TopologyError::ChannelError)?
    }

    /// Retry initialization of a node that is in `error`
    pub async fn reinitialize(&self, node_id: &NodeId) -> TopologyResponse<NodeSnapshot> {
        debug!(node = %node_id, "TopologyManager::reinitialize: called");
        let (reply, rx) = oneshot::channel();
        self.send(TopologyCommand::Reinitialize {
            id: node_id.clone(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| TopologyError::ChannelError)?
    }

    pub async fn metrics(&self) -> TopologyResponse<TopologyMetrics> {
        let (reply, rx) = oneshot::channel();
        self.send(TopologyCommand::GetMetrics { reply }).await?;
        let mut metrics = rx.await.map_err(|_| TopologyError::ChannelError)?;
        metrics.queue_depth = self.queue.depth();
        Ok(metrics)
    }

    /// Stop the actor and wait for the consumer and monitor loops to finish
    pub async fn shutdown(&self) -> TopologyResponse<()> {
        debug!("TopologyManager::shutdown: called");
        let (reply, rx) = oneshot::channel();
        self.send(TopologyCommand::Shutdown { reply }).await?;
        let loops = rx.await.map_err(|_| TopologyError::ChannelError)?;
        for handle in loops {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background loop ended abnormally");
            }
        }
        info!("Topology manager shut down");
        Ok(())
    }

    async fn send(&self, command: TopologyCommand) -> TopologyResponse<()> {
        self.tx.send(command).await.map_err(|_| TopologyError::ChannelError)
    }
}
