//! Cubed - cube topology coordinator
//!
//! Cubed runs a fixed topology of nine nodes: eight vertex roles (SCADA, HMI,
//! PLC, HISTORIAN, GATEWAY, LOAD_BALANCER, TRAINING, MONITORING) plus a
//! central COORDINATOR. Work is submitted to a FIFO queue and dispatched to
//! the target node's role handler, dependencies between nodes are refreshed
//! on a timer, and every status change is pushed to connected clients.
//!
//! # Modules
//!
//! - [`domain`] - Node ids, roles, node lifecycle and dependency resolution
//! - [`handlers`] - Pluggable per-role processing
//! - [`topology`] - Topology manager actor, task queue and dependency monitor
//! - [`hub`] - Real-time client registry, fan-out and channel protocol
//! - [`server`] - HTTP routes and WebSocket endpoint
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod handlers;
pub mod hub;
pub mod server;
pub mod topology;

// Re-export commonly used types
pub use config::{Config, ServerConfig, TrainingConfig, WebSocketConfig};
pub use domain::{
    FIXED_TOPOLOGY, Node, NodeError, NodeId, NodeIdentity, NodeSnapshot, NodeStatus, Payload, Role, TaskItem,
};
pub use handlers::{HandlerError, HandlerRegistry, MonitoringHandler, RoleHandler, TrainingHandler};
pub use hub::{BroadcastHub, BroadcastReport, ChannelReply, ChannelSession, ClientId, Envelope, HubError};
pub use server::{AppState, router, serve};
pub use topology::{
    CreateNodeRequest, InitReport, ManagerState, NodeCreated, TopologyConfig, TopologyError, TopologyManager,
    TopologyMetrics,
};
