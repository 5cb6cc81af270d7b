//! HTTP error mapping

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::hub::HubError;
use crate::topology::TopologyError;

/// Errors surfaced by HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Hub(#[from] HubError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Topology(e) => match e {
                TopologyError::ManagerNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
                TopologyError::NodeNotFound(_) | TopologyError::UnknownTargetDeferred(_) => StatusCode::NOT_FOUND,
                TopologyError::CreationFailed(_) => StatusCode::BAD_REQUEST,
                TopologyError::AlreadyInitialized | TopologyError::Node(_) => StatusCode::CONFLICT,
                TopologyError::QueueClosed | TopologyError::ChannelError => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Hub(HubError::DeliveryFailed(_)) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(%status, error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
