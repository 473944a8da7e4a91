//! Snapshot reporter
//!
//! Periodically pushes this node's status and health to the coordination
//! store, independent of task polling.

use chrono::Utc;
use convoy_core::Result;
use convoy_core::domain::node::{HealthReport, HealthStatus, NodeStatus};
use convoy_store::NodeRegistry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::service::{DeployLedger, HealthChecker, ProcessManager, SystemSampler};

pub struct SnapshotReporter {
    node_id: String,
    node_name: String,
    interval: Duration,
    registry: NodeRegistry,
    processes: Arc<ProcessManager>,
    health: Arc<HealthChecker>,
    ledger: Arc<DeployLedger>,
    sampler: SystemSampler,
    started: Instant,
}

impl SnapshotReporter {
    pub fn new(
        config: &Config,
        registry: NodeRegistry,
        processes: Arc<ProcessManager>,
        health: Arc<HealthChecker>,
        ledger: Arc<DeployLedger>,
    ) -> Self {
        Self {
            node_id: config.node_id.clone(),
            node_name: config.node_name.clone(),
            interval: config.report_interval,
            registry,
            processes,
            health,
            ledger,
            sampler: SystemSampler::new(),
            started: Instant::now(),
        }
    }

    /// Pushes a snapshot every interval until `shutdown` flips
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting snapshot reporter (interval: {:?})", self.interval);
        let mut ticker = time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            if let Err(e) = self.report_once().await {
                warn!("Failed to push snapshot: {}", e);
            }
        }
        debug!("Snapshot reporter stopped");
    }

    pub async fn report_once(&self) -> Result<()> {
        let (node, health) = self.snapshot().await;
        self.registry.push_snapshot(&node, &health).await?;
        debug!(
            "Pushed snapshot: services {}, health {}",
            node.service_status, health.status
        );
        Ok(())
    }

    pub async fn snapshot(&self) -> (NodeStatus, HealthStatus) {
        let mut services = BTreeMap::new();
        let mut reports = Vec::new();

        for name in self.processes.managed_services() {
            let mut runtime = self.processes.runtime(&name).await;
            let report = self.health.check_health(&name).await;
            runtime.healthy = Some(report.healthy);
            services.insert(name, runtime);
            reports.push(report);
        }

        let running = services.values().filter(|s| s.running).count();
        let service_status = match (services.len(), running) {
            (0, _) => "NONE",
            (total, up) if total == up => "RUNNING",
            (_, 0) => "STOPPED",
            _ => "PARTIAL",
        }
        .to_string();

        let now = Utc::now();
        let sample = self.sampler.sample();
        let last = self.ledger.last();
        let verdict = HealthStatus::verdict(&reports);

        let node = NodeStatus {
            node_id: self.node_id.clone(),
            node_name: self.node_name.clone(),
            service_status,
            services,
            cpu_usage: sample.cpu_usage,
            memory_usage: sample.memory_usage,
            health_status: verdict,
            last_heartbeat: now,
            last_deploy_time: last.time,
            last_deploy_version: last.version.clone(),
            uptime_secs: self.started.elapsed().as_secs(),
        };

        let health = HealthStatus {
            node_id: self.node_id.clone(),
            status: verdict,
            check_time: now,
            message: summarize(&reports),
            reports,
            last_deploy_time: last.time,
            last_deploy_version: last.version,
        };

        (node, health)
    }
}

fn summarize(reports: &[HealthReport]) -> String {
    if reports.is_empty() {
        return "no managed services".to_string();
    }
    let unhealthy: Vec<String> = reports
        .iter()
        .filter(|r| !r.healthy)
        .map(|r| format!("{}: {}", r.service_name, r.describe()))
        .collect();
    if unhealthy.is_empty() {
        format!("all {} service(s) healthy", reports.len())
    } else {
        unhealthy.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagedService;
    use convoy_core::domain::node::HealthVerdict;
    use convoy_store::{CoordinationStore, MemoryStore};

    fn reporter(config: &Config) -> (SnapshotReporter, NodeRegistry) {
        let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
        let registry = NodeRegistry::new(store);
        let processes = Arc::new(ProcessManager::new(config));
        let health = Arc::new(HealthChecker::new(config, processes.clone()));
        let reporter = SnapshotReporter::new(
            config,
            registry.clone(),
            processes,
            health,
            Arc::new(DeployLedger::default()),
        );
        (reporter, registry)
    }

    #[tokio::test]
    async fn test_empty_node_reports_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.node_id = "n1".to_string();
        config.work_dir = dir.path().to_path_buf();
        let (reporter, registry) = reporter(&config);

        reporter.report_once().await.unwrap();

        let node = registry.node_status("n1").await.unwrap().unwrap();
        assert_eq!(node.service_status, "NONE");
        assert_eq!(node.health_status, HealthVerdict::Unknown);
        let health = registry.health_status("n1").await.unwrap().unwrap();
        assert_eq!(health.message, "no managed services");
        assert!(registry.node_ids().await.unwrap().contains(&"n1".to_string()));
    }

    #[tokio::test]
    async fn test_stopped_service_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default().with_service(ManagedService {
            name: "api".to_string(),
            port: None,
            health_url: None,
        });
        config.node_id = "n1".to_string();
        config.work_dir = dir.path().to_path_buf();
        let (reporter, _registry) = reporter(&config);

        let (node, health) = reporter.snapshot().await;
        assert_eq!(node.service_status, "STOPPED");
        assert_eq!(node.services["api"].healthy, Some(false));
        assert_eq!(health.status, HealthVerdict::Unhealthy);
        assert_eq!(health.message, "api: process: process not running");
    }
}
