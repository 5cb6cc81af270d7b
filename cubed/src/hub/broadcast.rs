//! Broadcast hub - registry of connected clients and fan-out

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages::{Envelope, OutboundMessage};

/// Identifier of a connected client channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Delivery to a single client failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Delivery to {client} failed: {reason}")]
pub struct DeliveryFailure {
    pub client: ClientId,
    pub reason: String,
}

/// Errors from hub operations
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Delivery failed for all {} connected clients", .0.len())]
    DeliveryFailed(Vec<DeliveryFailure>),
}

/// Per-client results of one fan-out
#[derive(Debug, Clone, Default)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }
}

/// A registered channel: its id plus the receiving end of its outbound queue
#[derive(Debug)]
pub struct ClientConnection {
    pub id: ClientId,
    pub rx: mpsc::Receiver<OutboundMessage>,
}

struct HubInner {
    instance_id: String,
    client_buffer: usize,
    next_client: AtomicU64,
    clients: Mutex<HashMap<ClientId, mpsc::Sender<OutboundMessage>>>,
}

/// Shared set of live client channels; cheap to clone
///
/// Membership changes and fan-out take the same lock, so a broadcast sees a
/// consistent set of clients.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    /// Create a hub with a fresh instance id
    pub fn new(client_buffer: usize) -> Self {
        Self::with_instance_id(Uuid::now_v7().to_string(), client_buffer)
    }

    pub fn with_instance_id(instance_id: impl Into<String>, client_buffer: usize) -> Self {
        let instance_id = instance_id.into();
        debug!(%instance_id, client_buffer, "BroadcastHub::with_instance_id: called");
        Self {
            inner: Arc::new(HubInner {
                instance_id,
                client_buffer: client_buffer.max(1),
                next_client: AtomicU64::new(1),
                clients: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Identifier of this coordinator instance
    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    /// Allocate a client id and register a new outbound queue for it
    pub async fn connect(&self) -> ClientConnection {
        let id = ClientId(self.inner.next_client.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.inner.client_buffer);
        self.register(id, tx).await;
        ClientConnection { id, rx }
    }

    /// Add a client; returns false if it was already registered
    pub async fn register(&self, id: ClientId, tx: mpsc::Sender<OutboundMessage>) -> bool {
        let mut clients = self.inner.clients.lock().await;
        if clients.contains_key(&id) {
            debug!(%id, "BroadcastHub::register: already registered");
            return false;
        }
        clients.insert(id, tx);
        info!(%id, clients = clients.len(), "Client connected");
        true
    }

    /// Remove a client; returns false if it was not registered
    pub async fn unregister(&self, id: ClientId) -> bool {
        let mut clients = self.inner.clients.lock().await;
        let removed = clients.remove(&id).is_some();
        if removed {
            info!(%id, clients = clients.len(), "Client disconnected");
        } else {
            debug!(%id, "BroadcastHub::unregister: not registered");
        }
        removed
    }

    pub async fn client_count(&self) -> usize {
        self.inner.clients.lock().await.len()
    }

    /// Offer a message to every client without waiting on any of them
    ///
    /// A client whose queue is full or closed is recorded as a failure and
    /// stays registered; removal happens when its connection ends.
    pub async fn broadcast(&self, message: OutboundMessage) -> BroadcastReport {
        let clients = self.inner.clients.lock().await;
        debug!(clients = clients.len(), "BroadcastHub::broadcast: called");

        let mut report = BroadcastReport::default();
        for (id, tx) in clients.iter() {
            match tx.try_send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    let reason = match e {
                        TrySendError::Full(_) => "client queue full",
                        TrySendError::Closed(_) => "client channel closed",
                    };
                    warn!(client = %id, reason, "Broadcast delivery failed");
                    report.failures.push(DeliveryFailure {
                        client: *id,
                        reason: reason.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Wrap `data` in an envelope and fan it out
    pub async fn publish(&self, kind: &str, target_id: impl Into<String>, data: Value) -> BroadcastReport {
        let envelope = Envelope::new(kind, target_id, data);
        self.broadcast(OutboundMessage::Event(Arc::new(envelope))).await
    }

    /// Publish on behalf of a caller that needs to know whether anyone got it
    ///
    /// Fails only when there was at least one client and every delivery failed.
    pub async fn send_message(
        &self,
        target_id: impl Into<String>,
        kind: &str,
        data: Value,
    ) -> Result<BroadcastReport, HubError> {
        let report = self.publish(kind, target_id, data).await;
        if report.delivered == 0 && !report.failures.is_empty() {
            return Err(HubError::DeliveryFailed(report.failures));
        }
        Ok(report)
    }

    /// Drop every client's outbound queue, ending their writers
    pub async fn close_all(&self) {
        let mut clients = self.inner.clients.lock().await;
        info!(clients = clients.len(), "Closing all client channels");
        clients.clear();
    }
}

impl fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("instance_id", &self.inner.instance_id)
            .finish()
    }
}
