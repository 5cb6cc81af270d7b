//! Wire messages for real-time channels

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{NodeId, NodeSnapshot, NodeStatus, Payload};

/// Messages a client may send over its channel
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    CreateCube {
        #[serde(default)]
        cube_id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        cube_type: Option<String>,
        #[serde(default)]
        config: Payload,
    },
    ListCubes,
    PeerDiscovery {
        #[serde(default)]
        peer_id: Option<Value>,
    },
    /// Any other `type`; ignored
    #[serde(other)]
    Unknown,
}

/// Direct replies to the client that sent a request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelReply {
    CubeCreated { cube_id: NodeId, status: NodeStatus },
    CubeList { cubes: Vec<NodeSnapshot> },
    PeerAck { instance_id: String },
    Error { message: String },
}

/// Status push fanned out to every connected client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub target_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, target_id: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            target_id: target_id.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Anything queued for delivery on a client channel
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Reply(ChannelReply),
    Event(Arc<Envelope>),
}

impl OutboundMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            OutboundMessage::Reply(reply) => serde_json::to_string(reply),
            OutboundMessage::Event(envelope) => serde_json::to_string(envelope.as_ref()),
        }
    }
}

impl From<ChannelReply> for OutboundMessage {
    fn from(reply: ChannelReply) -> Self {
        OutboundMessage::Reply(reply)
    }
}
