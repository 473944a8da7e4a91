//! Deploy Service
//!
//! Validates deploy requests, distributes the artifact, records the new
//! version and enqueues one DEPLOY task per request. Completion is observed
//! through task status; there is no barrier across nodes or services.

use chrono::Utc;
use convoy_core::domain::task::{Task, TaskAction, TaskStatus};
use convoy_core::dto::deploy::{
    BatchDeployResult, DeployAccepted, DeployRequest, ServiceCommandRequest, ServiceSummary,
};
use convoy_core::{Error, Result, keys};
use convoy_store::TaskQueue;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::build::describe;
use super::distribution::DistributionEngine;
use super::versions::VersionStore;
use crate::config::Config;

pub struct DeployService {
    config: Arc<Config>,
    queue: TaskQueue,
    engine: Arc<DistributionEngine>,
    versions: Arc<VersionStore>,
}

impl DeployService {
    pub fn new(
        config: Arc<Config>,
        queue: TaskQueue,
        engine: Arc<DistributionEngine>,
        versions: Arc<VersionStore>,
    ) -> Self {
        Self {
            config,
            queue,
            engine,
            versions,
        }
    }

    /// Deploys one artifact to the requested nodes and returns the task id
    pub async fn deploy(&self, req: DeployRequest) -> Result<DeployAccepted> {
        req.validate()?;

        let artifact = Path::new(&req.artifact_path);
        let info = describe(artifact).await?;
        if info.size == 0 {
            return Err(Error::validation(format!(
                "artifact file is empty: {}",
                req.artifact_path
            )));
        }

        let method = self.engine.select(info.size);
        let locator = self
            .engine
            .distribute(artifact, &req.target_nodes, method)
            .await?;

        // Redeploying the current artifact reuses its version unless forced
        let current = match self.versions.current(&req.service_name).await? {
            Some(v) => self.versions.find(&req.service_name, &v).await?,
            None => None,
        };
        let reuse = current.filter(|v| !req.force_deploy && v.checksum == info.checksum);

        let version = match reuse {
            Some(v) => Some(v.version),
            None => match self
                .versions
                .record(
                    &req.service_name,
                    artifact,
                    info.size,
                    &info.checksum,
                    req.description.clone(),
                )
                .await
            {
                Ok(v) => Some(v.version),
                Err(e) => {
                    warn!(
                        "Deploying {} without a recorded version: {}",
                        req.service_name, e
                    );
                    None
                }
            },
        };

        let mut task = Task::new(TaskAction::Deploy, &req.service_name, req.target_nodes.clone())
            .with_artifact(locator, info.size, Some(info.checksum))
            .with_operator(req.operator.clone());
        if let Some(v) = &version {
            task = task.with_version(v);
        }

        self.queue.enqueue(&task).await?;

        info!(
            "Deploy task {} created for {} ({} bytes via {})",
            task.task_id, req.service_name, info.size, method
        );

        Ok(DeployAccepted {
            task_id: task.task_id,
            service_name: req.service_name,
            method,
            version,
            target_nodes: req.target_nodes,
        })
    }

    /// The configured service catalog, in configuration order
    pub fn catalog(&self) -> Vec<ServiceSummary> {
        self.config
            .services
            .iter()
            .map(|def| ServiceSummary {
                name: def.name.clone(),
                artifact_path: def.artifact_path.display().to_string(),
                target_nodes: def.target_nodes.clone(),
                description: def.description.clone(),
            })
            .collect()
    }

    /// Deploys every service in the catalog
    pub async fn deploy_all(&self, operator: Option<String>) -> BatchDeployResult {
        let names: Vec<String> = self.config.services.iter().map(|s| s.name.clone()).collect();
        self.deploy_selected(&names, operator).await
    }

    /// Deploys the named catalog services; failures are collected, not fatal
    pub async fn deploy_selected(
        &self,
        services: &[String],
        operator: Option<String>,
    ) -> BatchDeployResult {
        let start_time = Utc::now();
        let mut task_ids = Vec::new();
        let mut failures = BTreeMap::new();

        for name in services {
            let Some(def) = self.config.service(name) else {
                warn!("Skipping {}: not in the service catalog", name);
                failures.insert(name.clone(), "service not configured".to_string());
                continue;
            };

            let req = DeployRequest {
                service_name: def.name.clone(),
                artifact_path: def.artifact_path.display().to_string(),
                target_nodes: def.target_nodes.clone(),
                force_deploy: false,
                operator: operator.clone(),
                description: def.description.clone(),
            };

            match self.deploy(req).await {
                Ok(accepted) => task_ids.push(accepted.task_id),
                Err(e) => {
                    warn!("Batch deploy of {} failed: {}", name, e);
                    failures.insert(name.clone(), e.to_string());
                }
            }
        }

        let status = if failures.is_empty() {
            "SUBMITTED"
        } else if task_ids.is_empty() {
            "FAILED"
        } else {
            "PARTIAL"
        };
        info!(
            "Batch deploy submitted {} task(s), {} failure(s)",
            task_ids.len(),
            failures.len()
        );

        BatchDeployResult {
            total_services: services.len(),
            task_ids,
            failures,
            status: status.to_string(),
            start_time,
            operator,
        }
    }

    /// Enqueues a START, STOP or RESTART task
    pub async fn service_command(
        &self,
        service: &str,
        action: TaskAction,
        req: ServiceCommandRequest,
    ) -> Result<String> {
        if action.requires_artifact() {
            return Err(Error::validation(format!(
                "{} is not a service command",
                action
            )));
        }
        keys::validate_segment("service name", service)?;

        let targets = if req.target_nodes.is_empty() {
            self.config
                .service(service)
                .map(|s| s.target_nodes.clone())
                .ok_or_else(|| {
                    Error::validation(format!(
                        "no target nodes given and {} is not in the service catalog",
                        service
                    ))
                })?
        } else {
            req.target_nodes
        };

        let task = Task::new(action, service, targets).with_operator(req.operator);
        self.queue.enqueue(&task).await?;
        Ok(task.task_id)
    }

    pub async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        self.queue
            .board()
            .task_status(task_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("task {} not found", task_id)))
    }

    pub async fn task_statuses(&self, task_ids: &[String]) -> Result<Vec<TaskStatus>> {
        self.queue.board().task_statuses(task_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceDefinition;
    use convoy_core::domain::task::{DistributionMethod, TaskState};
    use convoy_store::{CoordinationStore, MemoryStore};
    use std::path::PathBuf;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        queue: TaskQueue,
        service: DeployService,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let mut config = Config::new("redis://unused".to_string(), &root);
        config.services = vec![ServiceDefinition {
            name: "svc-a".to_string(),
            artifact_path: root.join("svc-a.jar"),
            target_nodes: vec!["n1".to_string(), "n2".to_string()],
            description: None,
        }];
        let config = Arc::new(config);

        let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
        let queue = TaskQueue::new(Arc::clone(&store));
        let engine = Arc::new(DistributionEngine::new(Arc::clone(&store), &config));
        let versions = Arc::new(VersionStore::new(
            Arc::clone(&store),
            config.backup_dir.clone(),
            config.max_versions,
        ));
        let service = DeployService::new(config, queue.clone(), engine, versions);
        Fixture {
            _dir: dir,
            root,
            queue,
            service,
        }
    }

    fn request(fx: &Fixture, nodes: &[&str]) -> DeployRequest {
        DeployRequest {
            service_name: "svc-a".to_string(),
            artifact_path: fx.root.join("svc-a.jar").display().to_string(),
            target_nodes: nodes.iter().map(|n| n.to_string()).collect(),
            force_deploy: false,
            operator: Some("ops".to_string()),
            description: None,
        }
    }

    #[test]
    fn test_catalog_lists_configured_services() {
        let fx = fixture();
        let catalog = fx.service.catalog();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].name, "svc-a");
        assert_eq!(
            catalog[0].artifact_path,
            fx.root.join("svc-a.jar").display().to_string()
        );
        assert_eq!(catalog[0].target_nodes, vec!["n1", "n2"]);
        assert_eq!(catalog[0].description, None);
    }

    #[tokio::test]
    async fn test_deploy_fans_out_without_barrier() {
        let fx = fixture();
        let file = std::fs::File::create(fx.root.join("svc-a.jar")).unwrap();
        file.set_len(80 * 1024 * 1024).unwrap();

        let accepted = fx.service.deploy(request(&fx, &["n1", "n2"])).await.unwrap();
        assert_eq!(accepted.method, DistributionMethod::SharedStorage);
        assert!(accepted.task_id.starts_with("deploy_svc-a_"));

        let timeout = Duration::from_millis(50);
        let t1 = fx.queue.poll("n1", timeout).await.unwrap().unwrap();
        let t2 = fx.queue.poll("n2", timeout).await.unwrap().unwrap();
        assert_eq!(t1.task_id, accepted.task_id);
        assert_eq!(t2.task_id, accepted.task_id);
        assert_eq!(t1.version, accepted.version);

        let board = fx.queue.board();
        board.mark_running(&t1, "n1").await.unwrap();
        board.mark_success(&t1, "n1", "deployed").await.unwrap();
        board.mark_running(&t2, "n2").await.unwrap();
        board
            .mark_failed(&t2, "n2", &Error::process("startup timeout"))
            .await
            .unwrap();

        let n1 = board.node_status(&t1.task_id, "n1").await.unwrap().unwrap();
        assert_eq!(n1.status, TaskState::Success);
        let view = fx.service.task_status(&accepted.task_id).await.unwrap();
        assert_eq!(view.status, TaskState::Failed);
        assert_eq!(view.per_node_results["n1"], "SUCCESS: deployed");
    }

    #[tokio::test]
    async fn test_small_artifact_goes_inline() {
        let fx = fixture();
        std::fs::write(fx.root.join("svc-a.jar"), b"tiny").unwrap();

        let accepted = fx.service.deploy(request(&fx, &["n1"])).await.unwrap();
        assert_eq!(accepted.method, DistributionMethod::Inline);
    }

    #[tokio::test]
    async fn test_deploy_validation_and_missing_artifact() {
        let fx = fixture();
        let err = fx.service.deploy(request(&fx, &[])).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = fx.service.deploy(request(&fx, &["n1"])).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(fx.queue.depth("n1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_redeploy_reuses_version_unless_forced() {
        let fx = fixture();
        std::fs::write(fx.root.join("svc-a.jar"), b"same bytes").unwrap();

        let first = fx.service.deploy(request(&fx, &["n1"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(3)).await;
        let second = fx.service.deploy(request(&fx, &["n1"])).await.unwrap();
        assert_eq!(first.version, second.version);

        tokio::time::sleep(Duration::from_millis(3)).await;
        let mut forced = request(&fx, &["n1"]);
        forced.force_deploy = true;
        let third = fx.service.deploy(forced).await.unwrap();
        assert_ne!(first.version, third.version);
    }

    #[tokio::test]
    async fn test_batch_collects_failures() {
        let fx = fixture();
        std::fs::write(fx.root.join("svc-a.jar"), b"bytes").unwrap();

        let result = fx
            .service
            .deploy_selected(&["svc-a".to_string(), "svc-x".to_string()], None)
            .await;
        assert_eq!(result.total_services, 2);
        assert_eq!(result.task_ids.len(), 1);
        assert!(result.failures.contains_key("svc-x"));
        assert_eq!(result.status, "PARTIAL");

        let all = fx.service.deploy_all(None).await;
        assert_eq!(all.status, "SUBMITTED");
    }

    #[tokio::test]
    async fn test_service_command_uses_catalog_nodes() {
        let fx = fixture();
        let task_id = fx
            .service
            .service_command("svc-a", TaskAction::Restart, ServiceCommandRequest::default())
            .await
            .unwrap();
        assert!(task_id.starts_with("restart_svc-a_"));
        assert_eq!(fx.queue.depth("n2").await.unwrap(), 1);

        let err = fx
            .service
            .service_command("svc-z", TaskAction::Stop, ServiceCommandRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = fx
            .service
            .service_command("svc-a", TaskAction::Deploy, ServiceCommandRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let fx = fixture();
        assert!(matches!(
            fx.service.task_status("deploy_x_1").await,
            Err(Error::NotFound(_))
        ));
    }
}
