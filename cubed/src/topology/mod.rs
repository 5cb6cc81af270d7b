//! Topology manager - owns the cube's nodes and drives its background loops
//!
//! The manager is an actor: a single task owns the node map and handles
//! commands sent through a [`TopologyManager`] handle. Two loops run beside
//! it once the topology is initialized:
//!
//! - the task consumer, which takes queued items one at a time in FIFO order
//!   and hands each to its target node
//! - the dependency monitor, which periodically recomputes every node's
//!   dependency set
//!
//! Node status changes and sweeps are pushed to real-time clients through the
//! [`BroadcastHub`](crate::hub::BroadcastHub).

mod config;
mod core;
mod manager;
mod messages;
mod monitor;
mod queue;

pub use config::{DependencyConfig, IntervalSource, QueueConfig, TopologyConfig};
pub use self::core::TOPOLOGY_TARGET;
pub use manager::TopologyManager;
pub use messages::{
    CreateNodeRequest, DispatchOutcome, InitReport, ManagerState, NodeCreated, SweepReport, TopologyError,
    TopologyMetrics, TopologyResponse,
};
pub use queue::{QueueClosed, TaskQueue, TaskReceiver};
