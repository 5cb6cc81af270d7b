//! Role handlers - pluggable per-role processing
//!
//! Only roles with a registered handler do anything with a payload; every
//! other role accepts work as a no-op.

mod monitoring;
mod training;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::domain::{NodeIdentity, Payload, Role};

pub use monitoring::MonitoringHandler;
pub use training::TrainingHandler;

/// Errors raised by role handlers
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Handler unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

/// Processing capability for a single role
#[async_trait]
pub trait RoleHandler: Send + Sync {
    /// Role this handler serves
    fn role(&self) -> Role;

    /// Prepare role-specific resources for a node
    async fn initialize(&self, _node: &NodeIdentity, _config: &Payload) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Consume one payload, updating the node's metrics
    async fn process(&self, node: &NodeIdentity, metrics: &mut Payload, payload: &Payload) -> Result<(), HandlerError>;
}

/// Dispatch table from role to handler
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Role, Arc<dyn RoleHandler>>,
}

impl HandlerRegistry {
    /// Registry with no handlers; every role is a no-op
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in TRAINING and MONITORING handlers
    pub fn standard(training_batch_size: usize) -> Self {
        debug!(training_batch_size, "HandlerRegistry::standard: called");
        let mut registry = Self::empty();
        registry.register(Arc::new(TrainingHandler::new(training_batch_size)));
        registry.register(Arc::new(MonitoringHandler));
        registry
    }

    /// Register a handler, replacing any existing handler for the same role
    pub fn register(&mut self, handler: Arc<dyn RoleHandler>) {
        debug!(role = %handler.role(), "HandlerRegistry::register: called");
        self.handlers.insert(handler.role(), handler);
    }

    pub fn get(&self, role: Role) -> Option<Arc<dyn RoleHandler>> {
        self.handlers.get(&role).cloned()
    }

    pub fn roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.handlers.keys().copied().collect();
        roles.sort();
        roles
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry").field("roles", &self.roles()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_wires_two_roles() {
        let registry = HandlerRegistry::standard(32);
        assert_eq!(registry.roles(), vec![Role::Training, Role::Monitoring]);
        assert!(registry.get(Role::Scada).is_none());
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = HandlerRegistry::standard(32);
        registry.register(Arc::new(TrainingHandler::new(8)));
        assert_eq!(registry.roles().len(), 2);
    }
}
