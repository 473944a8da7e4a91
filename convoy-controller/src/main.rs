use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use convoy_store::{CoordinationStore, NodeRegistry, RedisStore, TaskQueue};

pub mod api;
pub mod config;
pub mod service;

use config::Config;
use service::{
    DeployService, DistributionEngine, LocalArtifactProvider, MonitorService, RollbackService,
    VersionStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convoy_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Convoy Controller...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;
    tracing::info!(
        "Loaded {} service definition(s); HTTP threshold {} bytes",
        config.services.len(),
        config.http_threshold
    );

    for dir in [&config.serve_dir, &config.backup_dir, &config.upload_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    if config.shared_storage_enabled {
        tokio::fs::create_dir_all(&config.shared_dir)
            .await
            .with_context(|| format!("Failed to create {}", config.shared_dir.display()))?;
    }

    tracing::info!("Connecting to coordination store...");
    let redis = RedisStore::connect(&config.redis_url, config.redis_pool_size)
        .await
        .context("Failed to connect to coordination store")?;
    let store: Arc<dyn CoordinationStore> = Arc::new(redis);
    tracing::info!("Coordination store connected");

    let config = Arc::new(config);
    let queue = TaskQueue::new(store.clone());
    let engine = Arc::new(DistributionEngine::new(store.clone(), &config));
    let versions = Arc::new(VersionStore::new(
        store.clone(),
        config.backup_dir.clone(),
        config.max_versions,
    ));

    let state = api::AppState {
        deploy: Arc::new(DeployService::new(
            config.clone(),
            queue.clone(),
            engine.clone(),
            versions.clone(),
        )),
        rollback: Arc::new(RollbackService::new(
            config.clone(),
            queue,
            engine,
            versions,
        )),
        monitor: Arc::new(MonitorService::new(
            NodeRegistry::new(store),
            config.stale_after(),
        )),
        builds: Arc::new(LocalArtifactProvider::new(
            config.artifact_root.clone(),
            config.upload_dir.clone(),
        )),
    };

    // Build router with all API endpoints
    let app = api::create_router(state, &config.serve_dir);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
