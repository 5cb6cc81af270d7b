//! Request handling for one real-time channel

use tracing::{debug, info, warn};

use super::broadcast::{BroadcastHub, ClientId};
use super::messages::{ChannelReply, InboundMessage};
use crate::domain::NodeId;
use crate::topology::{CreateNodeRequest, TopologyManager};

/// Answers the requests arriving on a single client channel
#[derive(Debug, Clone)]
pub struct ChannelSession {
    client: ClientId,
    manager: TopologyManager,
    hub: BroadcastHub,
}

impl ChannelSession {
    pub fn new(client: ClientId, manager: TopologyManager, hub: BroadcastHub) -> Self {
        Self { client, manager, hub }
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Parse and answer one text frame; `None` means nothing to send back
    pub async fn handle_text(&self, text: &str) -> Option<ChannelReply> {
        match serde_json::from_str::<InboundMessage>(text) {
            Ok(message) => self.handle(message).await,
            Err(e) => {
                warn!(client = %self.client, error = %e, "Malformed channel message");
                Some(ChannelReply::Error {
                    message: format!("Invalid message: {}", e),
                })
            }
        }
    }

    pub async fn handle(&self, message: InboundMessage) -> Option<ChannelReply> {
        match message {
            InboundMessage::CreateCube {
                cube_id,
                name,
                cube_type,
                config,
            } => {
                debug!(client = %self.client, ?cube_id, ?name, "ChannelSession::handle: create_cube");
                let request = CreateNodeRequest {
                    id: cube_id.map(NodeId::from),
                    name,
                    kind: cube_type,
                    config,
                };
                let reply = match self.manager.create_node(request).await {
                    Ok(created) => ChannelReply::CubeCreated {
                        cube_id: created.node_id,
                        status: created.status,
                    },
                    Err(e) => ChannelReply::Error { message: e.to_string() },
                };
                Some(reply)
            }

            InboundMessage::ListCubes => {
                debug!(client = %self.client, "ChannelSession::handle: list_cubes");
                let reply = match self.manager.list_nodes().await {
                    Ok(cubes) => ChannelReply::CubeList { cubes },
                    Err(e) => ChannelReply::Error { message: e.to_string() },
                };
                Some(reply)
            }

            InboundMessage::PeerDiscovery { peer_id } => {
                info!(client = %self.client, ?peer_id, "Peer discovery");
                Some(ChannelReply::PeerAck {
                    instance_id: self.hub.instance_id().to_string(),
                })
            }

            InboundMessage::Unknown => {
                debug!(client = %self.client, "ChannelSession::handle: ignoring unknown message type");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeStatus;
    use crate::handlers::HandlerRegistry;
    use crate::topology::TopologyConfig;

    async fn session() -> ChannelSession {
        let hub = BroadcastHub::with_instance_id("instance-1", 8);
        let manager = TopologyManager::spawn(TopologyConfig::default(), HandlerRegistry::empty(), hub.clone());
        manager.initialize().await.unwrap();
        ChannelSession::new(ClientId(1), manager, hub)
    }

    #[tokio::test]
    async fn test_peer_discovery_acks_regardless_of_peer_id() {
        let session = session().await;
        for raw in [
            r#"{"type": "peer_discovery"}"#,
            r#"{"type": "peer_discovery", "peer_id": "remote"}"#,
        ] {
            match session.handle_text(raw).await {
                Some(ChannelReply::PeerAck { instance_id }) => assert_eq!(instance_id, "instance-1"),
                other => panic!("unexpected reply: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_create_and_list_cubes() {
        let session = session().await;
        let reply = session
            .handle_text(r#"{"type": "create_cube", "cube_id": "plant-a", "name": "plant a"}"#)
            .await;
        match reply {
            Some(ChannelReply::CubeCreated { cube_id, status }) => {
                assert_eq!(cube_id, NodeId::from("plant-a"));
                assert_eq!(status, NodeStatus::Active);
            }
            other => panic!("unexpected reply: {:?}", other),
        }

        match session.handle_text(r#"{"type": "list_cubes"}"#).await {
            Some(ChannelReply::CubeList { cubes }) => assert_eq!(cubes.len(), 10),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_type_ignored() {
        let session = session().await;
        assert!(session.handle_text(r#"{"type": "self_destruct"}"#).await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_error_reply() {
        let session = session().await;
        assert!(matches!(
            session.handle_text("not json").await,
            Some(ChannelReply::Error { .. })
        ));
        assert!(matches!(
            session.handle_text(r#"{"name": "no type"}"#).await,
            Some(ChannelReply::Error { .. })
        ));
    }
}
