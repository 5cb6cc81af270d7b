//! REST handlers

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::AppState;
use super::error::ApiError;
use crate::domain::{NodeId, Payload};
use crate::topology::CreateNodeRequest;

/// Body of `POST /api/cube/create`
#[derive(Debug, Deserialize)]
pub struct CreateCubeBody {
    #[serde(default)]
    pub cube_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub cube_type: Option<String>,
    #[serde(default)]
    pub config: Payload,
}

/// Body of `POST /api/cube/{id}/message`
#[derive(Debug, Deserialize)]
pub struct CubeMessageBody {
    pub message_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Body of `POST /api/cube/{id}/training`
#[derive(Debug, Deserialize)]
pub struct TrainingBody {
    #[serde(default)]
    pub data: Payload,
}

pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("status_handler: called");
    Json(json!({
        "status": state.manager.state(),
        "instance_id": state.hub.instance_id(),
        "connected_clients": state.hub.client_count().await,
        "queued_tasks": state.manager.queue_depth(),
        "timestamp": Utc::now(),
    }))
}

pub async fn list_cubes_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    debug!("list_cubes_handler: called");
    let cubes = state.manager.list_nodes().await?;
    Ok(Json(cubes))
}

pub async fn create_cube_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCubeBody>,
) -> Result<impl IntoResponse, ApiError> {
    debug!(name = %body.name, "create_cube_handler: called");
    let created = state
        .manager
        .create_node(CreateNodeRequest {
            id: body.cube_id.map(NodeId::from),
            name: Some(body.name),
            kind: body.cube_type,
            config: body.config,
        })
        .await?;

    Ok(Json(json!({
        "cube_id": created.node_id,
        "status": created.status,
        "timestamp": created.created_at,
    })))
}

pub async fn get_cube_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    debug!(%id, "get_cube_handler: called");
    let snapshot = state.manager.node_status(&NodeId::from(id)).await?;
    Ok(Json(snapshot))
}

pub async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CubeMessageBody>,
) -> Result<impl IntoResponse, ApiError> {
    debug!(%id, message_type = %body.message_type, "send_message_handler: called");
    let node_id = NodeId::from(id);
    state.manager.node_status(&node_id).await?;

    let report = state
        .hub
        .send_message(node_id.to_string(), &body.message_type, body.data)
        .await?;
    info!(cube = %node_id, delivered = report.delivered, "Message sent to clients");

    Ok(Json(json!({
        "status": "message_sent",
        "cube_id": node_id,
        "delivered": report.delivered,
    })))
}

pub async fn training_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<TrainingBody>,
) -> Result<impl IntoResponse, ApiError> {
    debug!(%id, "training_handler: called");
    let node_id = NodeId::from(id);
    let sequence = state.manager.submit(node_id.clone(), body.data).await?;

    Ok(Json(json!({
        "status": "queued",
        "cube_id": node_id,
        "sequence": sequence,
    })))
}
