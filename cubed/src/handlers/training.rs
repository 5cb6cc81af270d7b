//! TRAINING role handler

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{HandlerError, RoleHandler};
use crate::domain::{NodeIdentity, Payload, Role};

/// Counts training samples and tracks completed batches
#[derive(Debug, Clone)]
pub struct TrainingHandler {
    batch_size: usize,
}

impl TrainingHandler {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    fn sample_count(payload: &Payload) -> Result<u64, HandlerError> {
        match payload.get("samples") {
            None => Ok(1),
            Some(Value::Array(samples)) => Ok(samples.len() as u64),
            Some(other) => Err(HandlerError::InvalidPayload(format!(
                "samples must be an array, got {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl RoleHandler for TrainingHandler {
    fn role(&self) -> Role {
        Role::Training
    }

    async fn process(&self, node: &NodeIdentity, metrics: &mut Payload, payload: &Payload) -> Result<(), HandlerError> {
        let samples = Self::sample_count(payload)?;
        debug!(node = %node.id, samples, "TrainingHandler::process: called");

        let received = metrics.get("samples_received").and_then(Value::as_u64).unwrap_or(0) + samples;
        let batches_before = metrics.get("batches_completed").and_then(Value::as_u64).unwrap_or(0);
        let batches = received / self.batch_size as u64;

        metrics.insert("samples_received".to_string(), json!(received));
        metrics.insert("batches_completed".to_string(), json!(batches));
        metrics.insert("batch_size".to_string(), json!(self.batch_size));

        if batches > batches_before {
            info!(node = %node.id, batches, received, "Training batch completed");
        }
        Ok(())
    }
}
