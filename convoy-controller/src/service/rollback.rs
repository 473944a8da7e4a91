//! Rollback Service
//!
//! Controller-driven rollback: resolve the target version, check its backup
//! still exists, redistribute it as a ROLLBACK task, wait for every node to
//! finish, then advance the current pointer only if all nodes succeeded.

use chrono::Utc;
use convoy_core::domain::service::{RecordStatus, RollbackHistory, ServiceVersion};
use convoy_core::domain::task::{Task, TaskAction, TaskState, TaskStatus};
use convoy_core::dto::rollback::{RollbackDetail, RollbackRequest, RollbackResult};
use convoy_core::{Error, Result, keys};
use convoy_store::TaskQueue;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use super::distribution::DistributionEngine;
use super::versions::VersionStore;
use crate::config::Config;

pub struct RollbackService {
    config: Arc<Config>,
    queue: TaskQueue,
    engine: Arc<DistributionEngine>,
    versions: Arc<VersionStore>,
}

impl RollbackService {
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

    /// Rolls one service back on the requested nodes (or its catalog nodes)
    ///
    /// Errors before dispatch (unknown version, missing backup) are returned
    /// as `Err` and leave the current pointer untouched. Agent-side failures
    /// come back as a detail with `success == false`.
    pub async fn rollback(&self, service: &str, req: &RollbackRequest) -> Result<RollbackDetail> {
        keys::validate_segment("service name", service)?;
        let nodes = self.resolve_nodes(service, &req.target_nodes)?;

        let from = self.versions.current(service).await?;
        let target = self.resolve_target(service, req.target_version.as_deref()).await?;
        if from.as_deref() == Some(target.version.as_str()) {
            return Err(Error::conflict(format!(
                "{} is already at version {}",
                service, target.version
            )));
        }

        let backup = &target.artifact_path;
        let size = match tokio::fs::metadata(backup).await {
            Ok(m) if m.is_file() => m.len(),
            _ => {
                return Err(Error::not_found(format!(
                    "backup artifact not found: {}",
                    backup.display()
                )));
            }
        };

        let method = self.engine.select(size);
        let locator = self.engine.distribute(backup, &nodes, method).await?;
        let task = Task::new(TaskAction::Rollback, service, nodes)
            .with_artifact(locator, size, Some(target.checksum.clone()))
            .with_version(&target.version)
            .with_operator(req.operator.clone());
        self.queue.enqueue(&task).await?;

        info!(
            "Rolling back {} from {} to {} (task {})",
            service,
            from.as_deref().unwrap_or("none"),
            target.version,
            task.task_id
        );

        let outcome = self.await_terminal(&task.task_id).await;
        let (success, message) = match &outcome {
            Ok(status) if status.status == TaskState::Success => (true, None),
            Ok(status) => (
                false,
                Some(
                    status
                        .error_message
                        .clone()
                        .unwrap_or_else(|| format!("rollback finished as {}", status.status)),
                ),
            ),
            Err(e) => (false, Some(e.to_string())),
        };

        if success {
            self.versions.set_current(service, &target.version).await?;
            info!("{} rolled back to {}", service, target.version);
        } else {
            warn!(
                "Rollback of {} to {} failed: {}",
                service,
                target.version,
                message.as_deref().unwrap_or("unknown error")
            );
        }

        let history = RollbackHistory {
            service_name: service.to_string(),
            task_id: Some(task.task_id.clone()),
            from_version: from.clone(),
            to_version: target.version.clone(),
            reason: req.reason.clone(),
            operator: req.operator.clone(),
            rollback_time: Utc::now(),
            status: if success {
                RecordStatus::Success
            } else {
                RecordStatus::Failed
            },
            message: message.clone(),
        };
        if let Err(e) = self.versions.push_rollback(&history).await {
            warn!("Failed to record rollback history for {}: {}", service, e);
        }

        Ok(RollbackDetail {
            service_name: service.to_string(),
            task_id: Some(task.task_id),
            success,
            error_message: message,
            from_version: from,
            to_version: Some(target.version),
            rollback_time: history.rollback_time,
        })
    }

    /// Rolls every catalog service back to its previous version
    pub async fn rollback_all(&self, req: &RollbackRequest) -> RollbackResult {
        let names: Vec<String> = self.config.services.iter().map(|s| s.name.clone()).collect();
        self.rollback_selected(&names, req).await
    }

    /// Rolls the named services back concurrently; each gets its own detail
    pub async fn rollback_selected(&self, services: &[String], req: &RollbackRequest) -> RollbackResult {
        let start_time = Utc::now();
        // a batch always targets each service's previous version on its catalog nodes
        let req = RollbackRequest {
            target_version: None,
            target_nodes: Vec::new(),
            ..req.clone()
        };

        let details = join_all(services.iter().map(|name| {
            let req = &req;
            async move {
                match self.rollback(name, req).await {
                    Ok(detail) => detail,
                    Err(e) => RollbackDetail {
                        service_name: name.clone(),
                        task_id: None,
                        success: false,
                        error_message: Some(e.to_string()),
                        from_version: None,
                        to_version: None,
                        rollback_time: Utc::now(),
                    },
                }
            }
        }))
        .await;

        RollbackResult::from_details(details, start_time, req.operator.clone())
    }

    pub async fn history(&self, service: &str) -> Result<Vec<RollbackHistory>> {
        self.versions.rollback_history(service).await
    }

    pub async fn versions(&self, service: &str) -> Result<Vec<ServiceVersion>> {
        self.versions.list(service).await
    }

    fn resolve_nodes(&self, service: &str, explicit: &[String]) -> Result<Vec<String>> {
        if !explicit.is_empty() {
            return Ok(explicit.to_vec());
        }
        self.config
            .service(service)
            .map(|s| s.target_nodes.clone())
            .ok_or_else(|| {
                Error::not_found(format!(
                    "no target nodes given and {} is not in the service catalog",
                    service
                ))
            })
    }

    async fn resolve_target(&self, service: &str, version: Option<&str>) -> Result<ServiceVersion> {
        match version {
            Some(v) => self
                .versions
                .find(service, v)
                .await?
                .ok_or_else(|| Error::not_found(format!("version {} of {} not found", v, service))),
            None => self.versions.previous(service).await,
        }
    }

    /// Polls the aggregate status until it is terminal or the rollback times out
    async fn await_terminal(&self, task_id: &str) -> Result<TaskStatus> {
        let deadline = tokio::time::Instant::now() + self.config.rollback_timeout;
        let interval = self.config.rollback_poll_interval;

        loop {
            if let Some(status) = self.queue.board().task_status(task_id).await? {
                if status.status.is_terminal() {
                    return Ok(status);
                }
            }

            if tokio::time::Instant::now() + interval > deadline {
                return Err(Error::process(format!(
                    "timed out after {:?} waiting for rollback task {}",
                    self.config.rollback_timeout, task_id
                )));
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceDefinition;
    use convoy_store::{CoordinationStore, MemoryStore};
    use std::path::PathBuf;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        queue: TaskQueue,
        versions: Arc<VersionStore>,
        service: Arc<RollbackService>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let mut config = Config::new("redis://unused".to_string(), &root);
        config.rollback_timeout = Duration::from_secs(2);
        config.rollback_poll_interval = Duration::from_millis(20);
        config.services = vec![ServiceDefinition {
            name: "svc-a".to_string(),
            artifact_path: root.join("svc-a.jar"),
            target_nodes: vec!["n1".to_string()],
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
        let service = Arc::new(RollbackService::new(
            config,
            queue.clone(),
            engine,
            Arc::clone(&versions),
        ));
        Fixture {
            _dir: dir,
            root,
            queue,
            versions,
            service,
        }
    }

    async fn two_versions(fx: &Fixture) -> (ServiceVersion, ServiceVersion) {
        let artifact = fx.root.join("svc-a.jar");
        std::fs::write(&artifact, b"v1").unwrap();
        let v1 = fx.versions.record("svc-a", &artifact, 2, "sum1", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(3)).await;
        std::fs::write(&artifact, b"v2").unwrap();
        let v2 = fx.versions.record("svc-a", &artifact, 2, "sum2", None).await.unwrap();
        (v1, v2)
    }

    /// Pops the node's next task and finishes it the way an agent would
    fn fake_agent(queue: TaskQueue, node: &'static str, outcome: Option<&'static str>) {
        tokio::spawn(async move {
            let task = queue
                .poll(node, Duration::from_secs(2))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(task.action, TaskAction::Rollback);
            let board = queue.board();
            board.mark_running(&task, node).await.unwrap();
            match outcome {
                None => board.mark_success(&task, node, "rolled back").await.unwrap(),
                Some(msg) => board
                    .mark_failed(&task, node, &Error::process(msg))
                    .await
                    .unwrap(),
            };
        });
    }

    #[tokio::test]
    async fn test_rollback_advances_pointer_on_success() {
        let fx = fixture();
        let (v1, v2) = two_versions(&fx).await;
        fake_agent(fx.queue.clone(), "n1", None);

        let detail = fx
            .service
            .rollback("svc-a", &RollbackRequest::default())
            .await
            .unwrap();
        assert!(detail.success);
        assert_eq!(detail.from_version, Some(v2.version));
        assert_eq!(detail.to_version, Some(v1.version.clone()));
        assert_eq!(fx.versions.current("svc-a").await.unwrap(), Some(v1.version));

        let history = fx.service.history("svc-a").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, RecordStatus::Success);
    }

    #[tokio::test]
    async fn test_agent_failure_keeps_pointer() {
        let fx = fixture();
        let (_v1, v2) = two_versions(&fx).await;
        fake_agent(fx.queue.clone(), "n1", Some("health check failed: port: connection refused"));

        let detail = fx
            .service
            .rollback("svc-a", &RollbackRequest::default())
            .await
            .unwrap();
        assert!(!detail.success);
        assert_eq!(
            detail.error_message.as_deref(),
            Some("n1: health check failed: port: connection refused")
        );
        assert_eq!(fx.versions.current("svc-a").await.unwrap(), Some(v2.version));

        let history = fx.service.history("svc-a").await.unwrap();
        assert_eq!(history[0].status, RecordStatus::Failed);
    }

    #[tokio::test]
    async fn test_missing_backup_is_not_found_and_pointer_unchanged() {
        let fx = fixture();
        let (v1, v2) = two_versions(&fx).await;
        std::fs::remove_file(&v1.artifact_path).unwrap();

        let err = fx
            .service
            .rollback("svc-a", &RollbackRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(fx.versions.current("svc-a").await.unwrap(), Some(v2.version));
        assert_eq!(fx.queue.depth("n1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_explicit_target_and_unknown_version() {
        let fx = fixture();
        let (_v1, v2) = two_versions(&fx).await;

        let req = RollbackRequest {
            target_version: Some("v1".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            fx.service.rollback("svc-a", &req).await,
            Err(Error::NotFound(_))
        ));

        let req = RollbackRequest {
            target_version: Some(v2.version),
            ..Default::default()
        };
        assert!(matches!(
            fx.service.rollback("svc-a", &req).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_rollback_times_out_without_agent() {
        let fx = fixture();
        two_versions(&fx).await;

        let detail = fx
            .service
            .rollback("svc-a", &RollbackRequest::default())
            .await
            .unwrap();
        assert!(!detail.success);
        assert!(detail.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_batch_rollback_reports_per_service() {
        let fx = fixture();
        two_versions(&fx).await;
        fake_agent(fx.queue.clone(), "n1", None);

        let result = fx
            .service
            .rollback_selected(
                &["svc-a".to_string(), "svc-x".to_string()],
                &RollbackRequest::default(),
            )
            .await;
        assert_eq!(result.total_services, 2);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.status, "PARTIAL");
    }
}
