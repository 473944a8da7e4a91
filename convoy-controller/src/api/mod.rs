//! API Module
//!
//! HTTP API layer for the controller. Each handler maps onto exactly one
//! service operation; no orchestration logic lives here.

pub mod artifact;
pub mod deploy;
pub mod error;
pub mod health;
pub mod monitor;
pub mod rollback;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::service::{BuildProvider, DeployService, MonitorService, RollbackService};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub deploy: Arc<DeployService>,
    pub rollback: Arc<RollbackService>,
    pub monitor: Arc<MonitorService>,
    pub builds: Arc<dyn BuildProvider>,
}

/// Create the main API router with all endpoints
///
/// `serve_dir` is exposed under `/artifacts` for HTTP distribution.
pub fn create_router(state: AppState, serve_dir: &Path) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Artifact endpoints
        .route("/api/build", post(artifact::build))
        .route(
            "/api/artifacts/{file_name}",
            put(artifact::upload).layer(DefaultBodyLimit::disable()),
        )
        // Deploy endpoints
        .route("/api/deploy", post(deploy::deploy))
        .route("/api/deploy/all", post(deploy::deploy_all))
        .route("/api/deploy/selected", post(deploy::deploy_selected))
        .route("/api/services", get(deploy::list_services))
        .route(
            "/api/services/{service}/versions",
            get(rollback::list_versions),
        )
        .route(
            "/api/services/{service}/{action}",
            post(deploy::service_command),
        )
        // Rollback endpoints
        .route("/api/rollback/all", post(rollback::rollback_all))
        .route("/api/rollback/selected", post(rollback::rollback_selected))
        .route("/api/rollback/{service}", post(rollback::rollback))
        .route("/api/rollback/{service}/history", get(rollback::history))
        // Task endpoints
        .route("/api/tasks/status", post(deploy::task_statuses))
        .route("/api/tasks/{task_id}", get(deploy::task_status))
        // Monitoring endpoints
        .route("/api/nodes", get(monitor::list_nodes))
        .route("/api/nodes/{node_id}", get(monitor::get_node))
        .route("/api/nodes/{node_id}/health", get(monitor::node_health))
        .route(
            "/api/nodes/{node_id}/services/{service}/deploys",
            get(monitor::deploy_history),
        )
        .route("/api/health", get(monitor::all_health))
        // Artifacts fetched by agents for HTTP distribution
        .nest_service("/artifacts", ServeDir::new(serve_dir))
        // Add state and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
