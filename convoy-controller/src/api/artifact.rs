//! Artifact API Handlers

use axum::{
    Json,
    body::Body,
    extract::{Path, State},
};
use futures::TryStreamExt;
use convoy_core::dto::artifact::{ArtifactInfo, BuildRequest};

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /api/build
/// Resolve a project reference to an artifact via the build provider
pub async fn build(
    State(state): State<AppState>,
    Json(req): Json<BuildRequest>,
) -> ApiResult<Json<ArtifactInfo>> {
    tracing::info!("Resolving artifact for {}", req.project_ref);

    let info = state.builds.resolve_artifact(&req.project_ref).await?;
    Ok(Json(info))
}

/// PUT /api/artifacts/{file_name}
/// Upload raw artifact bytes, streamed straight to disk
pub async fn upload(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
    body: Body,
) -> ApiResult<Json<ArtifactInfo>> {
    tracing::info!("Receiving upload {}", file_name);

    let stream = body.into_data_stream().map_err(std::io::Error::other);
    let info = state
        .builds
        .store_upload(&file_name, Box::pin(stream))
        .await?;
    Ok(Json(info))
}
