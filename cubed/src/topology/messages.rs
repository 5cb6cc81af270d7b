//! Commands, responses and errors for the topology manager

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::domain::{NodeError, NodeId, NodeSnapshot, NodeStatus, Payload, Role, TaskItem};

/// Lifecycle of the manager itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerState {
    Uninitialized,
    Initializing,
    Running,
    Stopped,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ManagerState::Uninitialized => "uninitialized",
            ManagerState::Initializing => "initializing",
            ManagerState::Running => "running",
            ManagerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Errors from topology operations
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Topology manager not ready (state: {0})")]
    ManagerNotReady(ManagerState),

    #[error("Topology already initialized")]
    AlreadyInitialized,

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Task target {0} does not exist; task dropped")]
    UnknownTargetDeferred(NodeId),

    #[error("Node creation failed: {0}")]
    CreationFailed(String),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error("Task queue closed")]
    QueueClosed,

    #[error("Topology channel closed")]
    ChannelError,
}

/// Response from topology operations
pub type TopologyResponse<T> = Result<T, TopologyError>;

/// Request to create an ad hoc node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNodeRequest {
    /// Caller-chosen id; generated when absent
    #[serde(default)]
    pub id: Option<NodeId>,
    #[serde(default)]
    pub name: Option<String>,
    /// Role name or free-form cube type
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub config: Payload,
}

/// Result of creating an ad hoc node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCreated {
    pub node_id: NodeId,
    pub name: String,
    pub role: Role,
    pub status: NodeStatus,
    pub created_at: DateTime<Utc>,
}

/// Result of bringing up the fixed topology
#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    /// Nodes in initialization order
    pub nodes: Vec<NodeSnapshot>,
}

impl InitReport {
    pub fn failed(&self) -> Vec<&NodeSnapshot> {
        self.nodes.iter().filter(|n| n.status == NodeStatus::Error).collect()
    }
}

/// What the consumer did with one task item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Processed,
    NoHandler,
    Skipped(NodeStatus),
    /// Target unknown at consumption time
    Dropped,
    Failed(String),
}

/// Result of one dependency sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub sweep: u64,
    pub refreshed: usize,
    pub changed: Vec<NodeId>,
    pub failures: Vec<(NodeId, String)>,
}

/// Counters for observability
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopologyMetrics {
    pub nodes: usize,
    pub processed: u64,
    pub no_handler: u64,
    pub skipped: u64,
    pub dropped: u64,
    pub failed: u64,
    pub sweeps: u64,
    pub refresh_failures: u64,
    pub queue_depth: usize,
}

impl TopologyMetrics {
    /// Items the consumer has finished with, whatever the outcome
    pub fn consumed(&self) -> u64 {
        self.processed + self.no_handler + self.skipped + self.dropped + self.failed
    }
}

/// Commands sent to the topology actor
#[derive(Debug)]
pub(crate) enum TopologyCommand {
    Initialize {
        reply: oneshot::Sender<TopologyResponse<InitReport>>,
    },
    CreateNode {
        request: CreateNodeRequest,
        reply: oneshot::Sender<TopologyResponse<NodeCreated>>,
    },
    Reinitialize {
        id: NodeId,
        reply: oneshot::Sender<TopologyResponse<NodeSnapshot>>,
    },
    NodeStatus {
        id: NodeId,
        reply: oneshot::Sender<TopologyResponse<NodeSnapshot>>,
    },
    ListNodes {
        reply: oneshot::Sender<TopologyResponse<Vec<NodeSnapshot>>>,
    },
    GetMetrics {
        reply: oneshot::Sender<TopologyMetrics>,
    },

    // Issued by the background loops
    Dispatch {
        item: TaskItem,
        reply: oneshot::Sender<DispatchOutcome>,
    },
    RefreshDependencies {
        reply: oneshot::Sender<SweepReport>,
    },

    Shutdown {
        reply: oneshot::Sender<Vec<JoinHandle<()>>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_not_ready_message() {
        let err = TopologyError::ManagerNotReady(ManagerState::Initializing);
        assert_eq!(err.to_string(), "Topology manager not ready (state: initializing)");
    }

    #[test]
    fn test_create_request_defaults() {
        let request: CreateNodeRequest = serde_json::from_str(r#"{"name": "plant"}"#).unwrap();
        assert_eq!(request.name.as_deref(), Some("plant"));
        assert!(request.id.is_none());
        assert!(request.config.is_empty());
    }

    #[test]
    fn test_metrics_consumed() {
        let metrics = TopologyMetrics {
            processed: 3,
            dropped: 1,
            failed: 1,
            ..Default::default()
        };
        assert_eq!(metrics.consumed(), 5);
    }
}
