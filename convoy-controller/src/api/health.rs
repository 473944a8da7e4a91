//! Health Check API Handler

use axum::{http::StatusCode, response::IntoResponse};

/// GET /health
/// Controller liveness
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
