//! Deploy and Task API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use convoy_core::domain::task::{TaskAction, TaskStatus};
use convoy_core::dto::deploy::{
    BatchDeployRequest, BatchDeployResult, DeployAccepted, DeployRequest, SelectedDeployRequest,
    ServiceCommandRequest, ServiceSummary, TaskAccepted,
};
use convoy_core::dto::monitor::TaskStatusQuery;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

// =============================================================================
// Deploy Endpoints
// =============================================================================

/// POST /api/deploy
/// Deploy one artifact to a set of nodes
pub async fn deploy(
    State(state): State<AppState>,
    Json(req): Json<DeployRequest>,
) -> ApiResult<(StatusCode, Json<DeployAccepted>)> {
    tracing::info!(
        "Deploy requested for {} on {:?}",
        req.service_name,
        req.target_nodes
    );

    let accepted = state.deploy.deploy(req).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// POST /api/deploy/all
/// Deploy every service in the catalog
pub async fn deploy_all(
    State(state): State<AppState>,
    Json(req): Json<BatchDeployRequest>,
) -> ApiResult<Json<BatchDeployResult>> {
    Ok(Json(state.deploy.deploy_all(req.operator).await))
}

/// POST /api/deploy/selected
/// Deploy the named catalog services
pub async fn deploy_selected(
    State(state): State<AppState>,
    Json(req): Json<SelectedDeployRequest>,
) -> ApiResult<Json<BatchDeployResult>> {
    if req.services.is_empty() {
        return Err(ApiError::BadRequest("no services selected".to_string()));
    }
    Ok(Json(
        state
            .deploy
            .deploy_selected(&req.services, req.operator)
            .await,
    ))
}

/// GET /api/services
/// List the configured service catalog
pub async fn list_services(State(state): State<AppState>) -> Json<Vec<ServiceSummary>> {
    Json(state.deploy.catalog())
}

/// POST /api/services/{service}/{action}
/// Start, stop or restart a service
pub async fn service_command(
    State(state): State<AppState>,
    Path((service, action)): Path<(String, String)>,
    Json(req): Json<ServiceCommandRequest>,
) -> ApiResult<(StatusCode, Json<TaskAccepted>)> {
    let action: TaskAction = action.parse()?;
    tracing::info!("{} requested for {}", action, service);

    let task_id = state.deploy.service_command(&service, action, req).await?;
    Ok((StatusCode::ACCEPTED, Json(TaskAccepted { task_id })))
}

// =============================================================================
// Task Status Endpoints
// =============================================================================

/// GET /api/tasks/{task_id}
/// Aggregated status over every target node
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskStatus>> {
    tracing::debug!("Getting task status: {}", task_id);

    Ok(Json(state.deploy.task_status(&task_id).await?))
}

/// POST /api/tasks/status
/// Batch status lookup; unknown ids are omitted
pub async fn task_statuses(
    State(state): State<AppState>,
    Json(query): Json<TaskStatusQuery>,
) -> ApiResult<Json<Vec<TaskStatus>>> {
    Ok(Json(state.deploy.task_statuses(&query.task_ids).await?))
}
