//! Monitoring API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use convoy_core::domain::node::HealthStatus;
use convoy_core::domain::service::DeployRecord;
use convoy_core::dto::monitor::NodeView;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// GET /api/nodes
pub async fn list_nodes(State(state): State<AppState>) -> ApiResult<Json<Vec<NodeView>>> {
    Ok(Json(state.monitor.nodes().await?))
}

/// GET /api/nodes/{node_id}
pub async fn get_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> ApiResult<Json<NodeView>> {
    Ok(Json(state.monitor.node(&node_id).await?))
}

/// GET /api/nodes/{node_id}/health
pub async fn node_health(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> ApiResult<Json<HealthStatus>> {
    Ok(Json(state.monitor.node_health(&node_id).await?))
}

/// GET /api/health
/// Latest health snapshot of every node
pub async fn all_health(State(state): State<AppState>) -> ApiResult<Json<Vec<HealthStatus>>> {
    Ok(Json(state.monitor.health().await?))
}

/// GET /api/nodes/{node_id}/services/{service}/deploys
pub async fn deploy_history(
    State(state): State<AppState>,
    Path((node_id, service)): Path<(String, String)>,
) -> ApiResult<Json<Vec<DeployRecord>>> {
    Ok(Json(state.monitor.deploy_history(&node_id, &service).await?))
}
