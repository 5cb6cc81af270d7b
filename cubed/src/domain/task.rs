//! Work items routed through the task queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::NodeId;

/// Role-specific payload, opaque to the core
pub type Payload = Map<String, Value>;

/// A unit of role-dispatched work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskItem {
    /// Position in queue order, assigned as the item is enqueued
    pub sequence: u64,
    pub target: NodeId,
    pub payload: Payload,
    pub submitted_at: DateTime<Utc>,
}

impl TaskItem {
    pub fn new(sequence: u64, target: NodeId, payload: Payload) -> Self {
        Self {
            sequence,
            target,
            payload,
            submitted_at: Utc::now(),
        }
    }
}
