//! Rollback and Version API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use convoy_core::domain::service::{RollbackHistory, ServiceVersion};
use convoy_core::dto::rollback::{
    RollbackDetail, RollbackRequest, RollbackResult, SelectedRollbackRequest,
};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /api/rollback/{service}
/// Roll one service back and wait for the outcome
pub async fn rollback(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Json(req): Json<RollbackRequest>,
) -> ApiResult<Json<RollbackDetail>> {
    tracing::info!(
        "Rollback requested for {} (target: {})",
        service,
        req.target_version.as_deref().unwrap_or("previous")
    );

    Ok(Json(state.rollback.rollback(&service, &req).await?))
}

/// POST /api/rollback/all
/// Roll every catalog service back to its previous version
pub async fn rollback_all(
    State(state): State<AppState>,
    Json(req): Json<RollbackRequest>,
) -> ApiResult<Json<RollbackResult>> {
    Ok(Json(state.rollback.rollback_all(&req).await))
}

/// POST /api/rollback/selected
/// Roll the named services back to their previous versions
pub async fn rollback_selected(
    State(state): State<AppState>,
    Json(req): Json<SelectedRollbackRequest>,
) -> ApiResult<Json<RollbackResult>> {
    if req.services.is_empty() {
        return Err(ApiError::BadRequest("no services selected".to_string()));
    }
    let base = RollbackRequest {
        target_version: None,
        target_nodes: Vec::new(),
        reason: req.reason,
        operator: req.operator,
    };
    Ok(Json(
        state
            .rollback
            .rollback_selected(&req.services, &base)
            .await,
    ))
}

/// GET /api/rollback/{service}/history
pub async fn history(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<Json<Vec<RollbackHistory>>> {
    Ok(Json(state.rollback.history(&service).await?))
}

/// GET /api/services/{service}/versions
/// Versions newest first, with the current one flagged
pub async fn list_versions(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<Json<Vec<ServiceVersion>>> {
    Ok(Json(state.rollback.versions(&service).await?))
}
