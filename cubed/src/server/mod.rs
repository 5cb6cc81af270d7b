//! HTTP and WebSocket surface
//!
//! REST routes under `/api` expose the topology; `/ws` is the real-time
//! channel carrying status pushes and the request protocol.

mod error;
mod routes;
mod ws;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{Method, header};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::handlers::HandlerRegistry;
use crate::hub::BroadcastHub;
use crate::topology::{InitReport, TopologyManager, TopologyResponse};

pub use error::ApiError;
pub use routes::{CreateCubeBody, CubeMessageBody, TrainingBody};

/// Shared state for all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub manager: TopologyManager,
    pub hub: BroadcastHub,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

impl AppState {
    /// Spawn the hub and topology manager from config and bring the topology up
    pub async fn start(config: &Config) -> TopologyResponse<(Arc<Self>, InitReport)> {
        let hub = BroadcastHub::new(config.websocket.client_buffer);
        let handlers = HandlerRegistry::standard(config.training.batch_size);
        let manager = TopologyManager::spawn(config.topology.clone(), handlers, hub.clone());
        let report = manager.initialize().await?;

        let state = Arc::new(Self {
            manager,
            hub,
            ping_interval: config.websocket.ping_interval(),
            ping_timeout: config.websocket.ping_timeout(),
        });
        Ok((state, report))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/cube/status", get(routes::status_handler))
        .route("/api/cubes", get(routes::list_cubes_handler))
        .route("/api/cube/create", post(routes::create_cube_handler))
        .route("/api/cube/:id", get(routes::get_cube_handler))
        .route("/api/cube/:id/message", post(routes::send_message_handler))
        .route("/api/cube/:id/training", post(routes::training_handler))
        .route("/ws", get(ws::websocket_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` resolves, then close every client channel
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "HTTP server listening");

    let hub = state.hub.clone();
    let signal = async move {
        shutdown.await;
        hub.close_all().await;
    };

    axum::serve(listener, router(state)).with_graceful_shutdown(signal).await?;
    info!("HTTP server stopped");
    Ok(())
}
