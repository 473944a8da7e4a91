//! Convoy Agent
//!
//! Runs on every managed node. Pops tasks from this node's queue in the
//! coordination store, executes them against local services and writes the
//! outcome back.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Services: Process lifecycle, health checks, artifact receipt, execution
//! - Scheduler: Task polling and snapshot reporting, two independent loops

mod config;
mod scheduler;
mod service;

use anyhow::{Context, Result};
use convoy_store::{CoordinationStore, NodeRegistry, RedisStore, TaskQueue};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::scheduler::{SnapshotReporter, TaskPoller};
use crate::service::{
    ArtifactReceiver, DeployLedger, HealthChecker, ProcessManager, StandardTaskExecutor,
    TaskExecutor,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convoy_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Convoy Agent");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: node_id={}, work_dir={}, {} managed service(s)",
        config.node_id,
        config.work_dir.display(),
        config.services.len()
    );

    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.work_dir.display()))?;

    let redis = RedisStore::connect(&config.redis_url, config.redis_pool_size)
        .await
        .context("Failed to connect to coordination store")?;
    let store: Arc<dyn CoordinationStore> = Arc::new(redis);
    info!("Coordination store connected");

    // Initialize services
    let processes = Arc::new(ProcessManager::new(&config));
    let recovered = processes.recover().await;
    info!("Recovered {} running service(s)", recovered.len());

    let health = Arc::new(HealthChecker::new(&config, processes.clone()));
    let ledger = Arc::new(DeployLedger::default());
    let queue = TaskQueue::new(store.clone());
    let registry = NodeRegistry::new(store.clone());

    let receiver = ArtifactReceiver::new(&config, store.clone())?;
    let executor: Arc<dyn TaskExecutor> = Arc::new(StandardTaskExecutor::new(
        &config,
        processes.clone(),
        health.clone(),
        receiver,
        queue.board().clone(),
        registry.clone(),
        ledger.clone(),
    ));

    let reporter = SnapshotReporter::new(&config, registry, processes, health, ledger);
    let poller = TaskPoller::new(&config, queue, executor);

    info!("Agent initialized successfully");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!("Failed to listen for ctrl-c: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    let reporter_handle = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { reporter.run(shutdown).await })
    };

    if let Err(e) = poller.run(shutdown_rx).await {
        error!("Poller error: {:#}", e);
        return Err(e);
    }

    if let Err(e) = reporter_handle.await {
        error!("Reporter task failed: {}", e);
    }

    info!("Agent stopped");
    Ok(())
}

/// Loads configuration from environment variables
fn load_config() -> Result<Config> {
    let config = Config::from_env()?;
    config.validate()?;
    Ok(config)
}
