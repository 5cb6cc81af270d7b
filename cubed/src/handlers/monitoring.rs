//! MONITORING role handler

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::debug;

use super::{HandlerError, RoleHandler};
use crate::domain::{NodeIdentity, Payload, Role};

/// Records the most recent reading delivered to a monitoring node
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitoringHandler;

#[async_trait]
impl RoleHandler for MonitoringHandler {
    fn role(&self) -> Role {
        Role::Monitoring
    }

    async fn process(&self, node: &NodeIdentity, metrics: &mut Payload, payload: &Payload) -> Result<(), HandlerError> {
        debug!(node = %node.id, keys = payload.len(), "MonitoringHandler::process: called");
        let readings = metrics.get("readings").and_then(Value::as_u64).unwrap_or(0) + 1;

        metrics.insert("readings".to_string(), json!(readings));
        metrics.insert("last_reading".to_string(), Value::Object(payload.clone()));
        metrics.insert("last_reading_at".to_string(), json!(Utc::now().to_rfc3339()));
        Ok(())
    }
}
