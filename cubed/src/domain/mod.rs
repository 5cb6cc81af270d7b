//! Domain types for the cube topology

mod id;
mod node;
mod role;
mod task;

pub use id::NodeId;
pub use node::{
    DEPENDS_ON_KEY, DependencyPolicy, Node, NodeError, NodeIdentity, NodeSnapshot, NodeStatus, ProcessOutcome,
    TopologyView,
};
pub use role::{FIXED_TOPOLOGY, Role, UnknownRole};
pub use task::{Payload, TaskItem};
