//! Cube node model
//!
//! A Node owns its lifecycle status, dependency set and role-specific metrics.
//! Identity (id, name, role) is fixed at construction.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::id::NodeId;
use super::role::Role;
use super::task::Payload;
use crate::handlers::{HandlerError, RoleHandler};

/// Config key holding explicit dependency ids for a node
pub const DEPENDS_ON_KEY: &str = "depends_on";

/// Lifecycle status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Initializing,
    Active,
    Error,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Initializing => "initializing",
            NodeStatus::Active => "active",
            NodeStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Errors from node operations
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Node {node} failed to initialize: {reason}")]
    Init { node: NodeId, reason: String },

    #[error("Node {node} cannot leave status {from}")]
    InvalidTransition { node: NodeId, from: NodeStatus },

    #[error("Node {node} depends on unknown node {dependency}")]
    MissingDependency { node: NodeId, dependency: NodeId },

    #[error("Node {node} handler failed: {source}")]
    Handler {
        node: NodeId,
        #[source]
        source: HandlerError,
    },
}

/// Immutable identity of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub id: NodeId,
    pub name: String,
    pub role: Role,
}

/// What happened when a payload reached a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A role handler consumed the payload
    Handled,
    /// No handler registered for the role; silently accepted
    NoHandler,
    /// Node is not active; payload ignored
    Skipped(NodeStatus),
}

/// Point-in-time view of a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub node_id: NodeId,
    pub name: String,
    pub role: Role,
    pub status: NodeStatus,
    pub dependencies: Vec<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processed: u64,
    pub metrics: Payload,
    pub created_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// How dependencies are expanded during a refresh
#[derive(Debug, Clone, Copy)]
pub struct DependencyPolicy {
    /// Include transitive dependencies
    pub auto_resolve: bool,
    /// Maximum hops followed when auto-resolving
    pub max_depth: usize,
}

impl Default for DependencyPolicy {
    fn default() -> Self {
        Self {
            auto_resolve: true,
            max_depth: 5,
        }
    }
}

#[derive(Debug, Clone)]
struct ViewEntry {
    role: Role,
    fixed: bool,
    declared: Vec<NodeId>,
}

/// Read-only picture of the topology used to recompute dependencies
#[derive(Debug, Clone, Default)]
pub struct TopologyView {
    entries: BTreeMap<NodeId, ViewEntry>,
}

impl TopologyView {
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let entries = nodes
            .into_iter()
            .map(|node| {
                (
                    node.id().clone(),
                    ViewEntry {
                        role: node.role(),
                        fixed: node.id().is_fixed(),
                        declared: node.declared_dependencies(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Direct dependencies of a node: structural (fixed topology nodes holding
    /// the required roles) plus explicitly declared ids
    fn direct(&self, id: &NodeId) -> Result<BTreeSet<NodeId>, NodeId> {
        let Some(entry) = self.entries.get(id) else {
            return Ok(BTreeSet::new());
        };

        let mut deps: BTreeSet<NodeId> = self
            .entries
            .iter()
            .filter(|(other, e)| {
                *other != id && e.fixed && entry.role.structural_dependencies().contains(&e.role)
            })
            .map(|(other, _)| other.clone())
            .collect();

        for declared in &entry.declared {
            if !self.entries.contains_key(declared) {
                return Err(declared.clone());
            }
            if declared != id {
                deps.insert(declared.clone());
            }
        }

        Ok(deps)
    }

    /// Resolve the full dependency set for a node under the given policy
    pub fn resolve(&self, id: &NodeId, policy: DependencyPolicy) -> Result<BTreeSet<NodeId>, NodeId> {
        let direct = self.direct(id)?;
        if !policy.auto_resolve {
            return Ok(direct);
        }

        let mut resolved = direct.clone();
        let mut frontier: VecDeque<(NodeId, usize)> = direct.into_iter().map(|d| (d, 1)).collect();

        while let Some((current, depth)) = frontier.pop_front() {
            if depth >= policy.max_depth {
                continue;
            }
            // A broken declaration further down the chain only affects that node's own refresh
            let Ok(next) = self.direct(&current) else {
                continue;
            };
            for dep in next {
                if dep != *id && resolved.insert(dep.clone()) {
                    frontier.push_back((dep, depth + 1));
                }
            }
        }

        Ok(resolved)
    }
}

/// A single addressable unit of the cube
#[derive(Debug, Clone)]
pub struct Node {
    identity: NodeIdentity,
    config: Payload,
    status: NodeStatus,
    dependencies: BTreeSet<NodeId>,
    metrics: Payload,
    processed: u64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>, role: Role, config: Payload) -> Self {
        Self {
            identity: NodeIdentity {
                id,
                name: name.into(),
                role,
            },
            config,
            status: NodeStatus::Initializing,
            dependencies: BTreeSet::new(),
            metrics: Payload::new(),
            processed: 0,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.identity.id
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn role(&self) -> Role {
        self.identity.role
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn dependencies(&self) -> &BTreeSet<NodeId> {
        &self.dependencies
    }

    pub fn metrics(&self) -> &Payload {
        &self.metrics
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Ids listed under `depends_on` in the node config
    pub fn declared_dependencies(&self) -> Vec<NodeId> {
        match self.config.get(DEPENDS_ON_KEY) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).map(NodeId::from_index),
                    Value::String(s) => Some(NodeId::from(s.as_str())),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Bring the node from `initializing` to `active`
    ///
    /// On failure the node moves to `error` and the error is returned; the
    /// status change is the authoritative signal for the caller.
    pub async fn initialize(&mut self, handler: Option<&dyn RoleHandler>) -> Result<(), NodeError> {
        debug!(node = %self.identity.id, role = %self.identity.role, "Node::initialize: called");
        if self.status != NodeStatus::Initializing {
            return Err(NodeError::InvalidTransition {
                node: self.identity.id.clone(),
                from: self.status,
            });
        }

        let result = match handler {
            Some(handler) => AssertUnwindSafe(handler.initialize(&self.identity, &self.config))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(HandlerError::Other("handler panicked during initialization".to_string()))),
            None => Ok(()),
        };

        match result {
            Ok(()) => {
                self.status = NodeStatus::Active;
                self.last_error = None;
                info!(node = %self.identity.id, name = %self.identity.name, role = %self.identity.role, "Node initialized");
                Ok(())
            }
            Err(e) => {
                self.status = NodeStatus::Error;
                self.last_error = Some(e.to_string());
                warn!(node = %self.identity.id, name = %self.identity.name, error = %e, "Node failed to initialize");
                Err(NodeError::Init {
                    node: self.identity.id.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Put a failed node back into `initializing` so it can be initialized again
    pub fn reset(&mut self) -> Result<(), NodeError> {
        debug!(node = %self.identity.id, status = %self.status, "Node::reset: called");
        if self.status != NodeStatus::Error {
            return Err(NodeError::InvalidTransition {
                node: self.identity.id.clone(),
                from: self.status,
            });
        }
        self.status = NodeStatus::Initializing;
        Ok(())
    }

    /// Hand a payload to the role handler, if any
    pub async fn process(
        &mut self,
        handler: Option<&dyn RoleHandler>,
        payload: &Payload,
    ) -> Result<ProcessOutcome, NodeError> {
        debug!(node = %self.identity.id, status = %self.status, "Node::process: called");
        if self.status != NodeStatus::Active {
            debug!(node = %self.identity.id, "Node::process: node not active, skipping");
            return Ok(ProcessOutcome::Skipped(self.status));
        }

        let Some(handler) = handler else {
            debug!(node = %self.identity.id, role = %self.identity.role, "Node::process: no handler for role");
            return Ok(ProcessOutcome::NoHandler);
        };

        AssertUnwindSafe(handler.process(&self.identity, &mut self.metrics, payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(HandlerError::Other("handler panicked".to_string())))
            .map_err(|source| NodeError::Handler {
                node: self.identity.id.clone(),
                source,
            })?;

        self.processed += 1;
        Ok(ProcessOutcome::Handled)
    }

    /// Recompute the dependency set from the current topology
    ///
    /// Nodes in `error` keep their last refreshed set. A refresh that fails
    /// leaves the current set untouched. Returns whether the set changed.
    pub fn refresh_dependencies(&mut self, view: &TopologyView, policy: DependencyPolicy) -> Result<bool, NodeError> {
        debug!(node = %self.identity.id, "Node::refresh_dependencies: called");
        if self.status == NodeStatus::Error {
            debug!(node = %self.identity.id, "Node::refresh_dependencies: node in error, keeping frozen set");
            return Ok(false);
        }

        let resolved = view
            .resolve(&self.identity.id, policy)
            .map_err(|dependency| NodeError::MissingDependency {
                node: self.identity.id.clone(),
                dependency,
            })?;

        if resolved == self.dependencies {
            return Ok(false);
        }

        debug!(node = %self.identity.id, count = resolved.len(), "Node::refresh_dependencies: dependency set changed");
        self.dependencies = resolved;
        Ok(true)
    }

    /// Identity, status and dependencies with a fresh timestamp
    pub fn status_snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            node_id: self.identity.id.clone(),
            name: self.identity.name.clone(),
            role: self.identity.role,
            status: self.status,
            dependencies: self.dependencies.iter().cloned().collect(),
            error: self.last_error.clone(),
            processed: self.processed,
            metrics: self.metrics.clone(),
            created_at: self.created_at,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::domain::FIXED_TOPOLOGY;

    struct FailingInit;

    #[async_trait]
    impl RoleHandler for FailingInit {
        fn role(&self) -> Role {
            Role::Plc
        }

        async fn initialize(&self, _node: &NodeIdentity, _config: &Payload) -> Result<(), HandlerError> {
            Err(HandlerError::Unavailable("fieldbus offline".to_string()))
        }

        async fn process(
            &self,
            _node: &NodeIdentity,
            _metrics: &mut Payload,
            _payload: &Payload,
        ) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    struct Counting;

    #[async_trait]
    impl RoleHandler for Counting {
        fn role(&self) -> Role {
            Role::Training
        }

        async fn process(
            &self,
            _node: &NodeIdentity,
            metrics: &mut Payload,
            _payload: &Payload,
        ) -> Result<(), HandlerError> {
            let count = metrics.get("count").and_then(Value::as_u64).unwrap_or(0);
            metrics.insert("count".to_string(), json!(count + 1));
            Ok(())
        }
    }

    fn fixed_nodes() -> Vec<Node> {
        FIXED_TOPOLOGY
            .iter()
            .enumerate()
            .map(|(i, (name, role))| Node::new(NodeId::Index(i as u32 + 1), *name, *role, Payload::new()))
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_without_handler_activates() {
        let mut node = Node::new(NodeId::Index(1), "vertex_1", Role::Scada, Payload::new());
        assert_eq!(node.status(), NodeStatus::Initializing);
        node.initialize(None).await.unwrap();
        assert_eq!(node.status(), NodeStatus::Active);
    }

    #[tokio::test]
    async fn test_initialize_failure_moves_to_error() {
        let mut node = Node::new(NodeId::Index(3), "vertex_3", Role::Plc, Payload::new());
        let err = node.initialize(Some(&FailingInit)).await.unwrap_err();
        assert!(matches!(err, NodeError::Init { .. }));
        assert_eq!(node.status(), NodeStatus::Error);
        assert!(node.status_snapshot().error.unwrap().contains("fieldbus offline"));
    }

    #[tokio::test]
    async fn test_initialize_twice_is_invalid_transition() {
        let mut node = Node::new(NodeId::Index(1), "vertex_1", Role::Scada, Payload::new());
        node.initialize(None).await.unwrap();
        let err = node.initialize(None).await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidTransition { from: NodeStatus::Active, .. }));
    }

    #[tokio::test]
    async fn test_reset_only_from_error() {
        let mut node = Node::new(NodeId::Index(3), "vertex_3", Role::Plc, Payload::new());
        assert!(node.reset().is_err());
        let _ = node.initialize(Some(&FailingInit)).await;
        node.reset().unwrap();
        assert_eq!(node.status(), NodeStatus::Initializing);
        node.initialize(None).await.unwrap();
        assert_eq!(node.status(), NodeStatus::Active);
    }

    #[tokio::test]
    async fn test_process_without_handler_is_noop() {
        let mut node = Node::new(NodeId::Index(2), "vertex_2", Role::Hmi, Payload::new());
        node.initialize(None).await.unwrap();
        let outcome = node.process(None, &Payload::new()).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::NoHandler);
        assert_eq!(node.status_snapshot().processed, 0);
    }

    #[tokio::test]
    async fn test_process_skipped_when_in_error() {
        let mut node = Node::new(NodeId::Index(7), "vertex_7", Role::Training, Payload::new());
        let _ = node.initialize(Some(&FailingInit)).await;
        let outcome = node.process(Some(&Counting), &Payload::new()).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Skipped(NodeStatus::Error));
        assert!(node.metrics().get("count").is_none());
    }

    struct Panicking;

    #[async_trait]
    impl RoleHandler for Panicking {
        fn role(&self) -> Role {
            Role::Training
        }

        async fn process(
            &self,
            _node: &NodeIdentity,
            _metrics: &mut Payload,
            _payload: &Payload,
        ) -> Result<(), HandlerError> {
            panic!("model diverged");
        }
    }

    #[tokio::test]
    async fn test_process_panic_becomes_handler_error() {
        let mut node = Node::new(NodeId::Index(7), "vertex_7", Role::Training, Payload::new());
        node.initialize(None).await.unwrap();
        let err = node.process(Some(&Panicking), &Payload::new()).await.unwrap_err();
        assert!(matches!(err, NodeError::Handler { .. }));
        assert_eq!(node.status(), NodeStatus::Active);
    }

    #[tokio::test]
    async fn test_process_updates_metrics() {
        let mut node = Node::new(NodeId::Index(7), "vertex_7", Role::Training, Payload::new());
        node.initialize(None).await.unwrap();
        node.process(Some(&Counting), &Payload::new()).await.unwrap();
        node.process(Some(&Counting), &Payload::new()).await.unwrap();
        assert_eq!(node.metrics()["count"], json!(2));
        assert_eq!(node.status_snapshot().processed, 2);
    }

    #[test]
    fn test_direct_dependencies_follow_roles() {
        let nodes = fixed_nodes();
        let view = TopologyView::from_nodes(&nodes);
        let policy = DependencyPolicy {
            auto_resolve: false,
            max_depth: 5,
        };

        // HMI -> coordinator + SCADA
        let hmi = view.resolve(&NodeId::Index(2), policy).unwrap();
        assert_eq!(hmi, BTreeSet::from([NodeId::Index(1), NodeId::Index(9)]));

        // Coordinator has no structural deps
        assert!(view.resolve(&NodeId::Index(9), policy).unwrap().is_empty());
    }

    #[test]
    fn test_transitive_dependencies_respect_max_depth() {
        let nodes = fixed_nodes();
        let view = TopologyView::from_nodes(&nodes);

        // LOAD_BALANCER -> GATEWAY -> SCADA -> PLC
        let shallow = view
            .resolve(
                &NodeId::Index(6),
                DependencyPolicy {
                    auto_resolve: true,
                    max_depth: 1,
                },
            )
            .unwrap();
        assert_eq!(shallow, BTreeSet::from([NodeId::Index(5), NodeId::Index(9)]));

        let deep = view.resolve(&NodeId::Index(6), DependencyPolicy::default()).unwrap();
        assert!(deep.contains(&NodeId::Index(1)));
        assert!(deep.contains(&NodeId::Index(3)));
        assert!(!deep.contains(&NodeId::Index(6)));
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let mut nodes = fixed_nodes();
        for node in nodes.iter_mut() {
            node.initialize(None).await.unwrap();
        }
        let view = TopologyView::from_nodes(&nodes);
        let node = &mut nodes[1];

        assert!(node.refresh_dependencies(&view, DependencyPolicy::default()).unwrap());
        let first = node.dependencies().clone();
        assert!(!node.refresh_dependencies(&view, DependencyPolicy::default()).unwrap());
        assert_eq!(node.dependencies(), &first);
    }

    #[tokio::test]
    async fn test_refresh_with_missing_declared_dependency_keeps_old_set() {
        let mut nodes = fixed_nodes();
        let mut config = Payload::new();
        config.insert(DEPENDS_ON_KEY.to_string(), json!(["ghost"]));
        let mut adhoc = Node::new(NodeId::Named("plant".to_string()), "plant", Role::Monitoring, config);
        adhoc.initialize(None).await.unwrap();
        nodes.push(adhoc);

        let view = TopologyView::from_nodes(&nodes);
        let node = nodes.last_mut().unwrap();
        let err = node.refresh_dependencies(&view, DependencyPolicy::default()).unwrap_err();
        assert!(matches!(err, NodeError::MissingDependency { dependency, .. } if dependency == NodeId::from("ghost")));
        assert!(node.dependencies().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_skipped_for_failed_node() {
        let mut nodes = fixed_nodes();
        let _ = nodes[2].initialize(Some(&FailingInit)).await;
        let view = TopologyView::from_nodes(&nodes);
        assert!(!nodes[2].refresh_dependencies(&view, DependencyPolicy::default()).unwrap());
        assert!(nodes[2].dependencies().is_empty());
    }

    #[test]
    fn test_declared_dependencies_accept_numbers_and_strings() {
        let mut config = Payload::new();
        config.insert(DEPENDS_ON_KEY.to_string(), json!([4, "plant-b", true]));
        let node = Node::new(NodeId::generate(), "x", Role::Gateway, config);
        assert_eq!(
            node.declared_dependencies(),
            vec![NodeId::Index(4), NodeId::Named("plant-b".to_string())]
        );
    }

    #[test]
    fn test_snapshot_serializes_lowercase_status() {
        let node = Node::new(NodeId::Index(1), "vertex_1", Role::Scada, Payload::new());
        let json = serde_json::to_value(node.status_snapshot()).unwrap();
        assert_eq!(json["status"], "initializing");
        assert_eq!(json["role"], "SCADA");
        assert_eq!(json["node_id"], 1);
        assert!(json.get("error").is_none());
    }
}
