//! WebSocket channel handling

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::AppState;
use crate::hub::{ChannelSession, ClientConnection, KeepAlive, KeepAliveAction, OutboundMessage};

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Serve one client until it disconnects, stops answering pings, or the hub closes it
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let ClientConnection { id, mut rx } = state.hub.connect().await;
    let session = ChannelSession::new(id, state.manager.clone(), state.hub.clone());
    let (mut sender, mut receiver) = socket.split();
    let mut keepalive = KeepAlive::new(state.ping_interval, state.ping_timeout, Instant::now());

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(message) => {
                    if !send_json(&mut sender, &message).await {
                        break;
                    }
                }
                None => {
                    debug!(client = %id, "handle_websocket: hub closed channel");
                    break;
                }
            },

            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = session.handle_text(&text).await
                        && !send_json(&mut sender, &OutboundMessage::Reply(reply)).await
                    {
                        break;
                    }
                }
                Some(Ok(Message::Pong(_))) => keepalive.on_pong(),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Binary(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    debug!(client = %id, "handle_websocket: client closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!(client = %id, error = %e, "WebSocket receive failed");
                    break;
                }
            },

            _ = tokio::time::sleep_until(keepalive.deadline()) => match keepalive.on_deadline(Instant::now()) {
                KeepAliveAction::SendPing => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                KeepAliveAction::Expired => {
                    warn!(client = %id, "Pong not received in time, closing channel");
                    break;
                }
                KeepAliveAction::Wait => {}
            },
        }
    }

    state.hub.unregister(id).await;
    let _ = sender.close().await;
}

async fn send_json(sender: &mut SplitSink<WebSocket, Message>, message: &OutboundMessage) -> bool {
    let text = match message.to_json() {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to serialize outbound message");
            return true;
        }
    };
    sender.send(Message::Text(text)).await.is_ok()
}
