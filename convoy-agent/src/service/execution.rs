//! Task execution
//!
//! Runs one task's action on this node:
//! - DEPLOY / ROLLBACK: receive artifact, stop, move the install aside,
//!   install, start, verify health
//! - START / STOP / RESTART: delegate to the process manager
//!
//! A failed health verification leaves the new install in place and fails
//! the task; there is no automatic rollback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convoy_core::domain::service::{DeployRecord, RecordStatus};
use convoy_core::domain::task::{Task, TaskAction};
use convoy_core::{Error, Result};
use convoy_store::{NodeRegistry, StatusBoard};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::health::HealthChecker;
use super::lifecycle::ProcessManager;
use super::receive::ArtifactReceiver;
use crate::config::Config;

const BACKUPS_KEPT: usize = 3;

/// Service trait for executing tasks
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Runs the task's action; `Ok` carries the success message
    async fn execute(&self, task: &Task) -> Result<String>;
}

/// Most recent successful deploy on this node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastDeploy {
    pub time: Option<DateTime<Utc>>,
    pub version: Option<String>,
}

/// Shared between the executor and the snapshot reporter
#[derive(Debug, Default)]
pub struct DeployLedger {
    last: RwLock<LastDeploy>,
}

impl DeployLedger {
    pub fn record(&self, time: DateTime<Utc>, version: Option<String>) {
        let mut last = self.last.write().unwrap_or_else(|p| p.into_inner());
        *last = LastDeploy {
            time: Some(time),
            version,
        };
    }

    pub fn last(&self) -> LastDeploy {
        self.last.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

/// Standard implementation of TaskExecutor
pub struct StandardTaskExecutor {
    node_id: String,
    processes: Arc<ProcessManager>,
    health: Arc<HealthChecker>,
    receiver: ArtifactReceiver,
    board: StatusBoard,
    registry: NodeRegistry,
    ledger: Arc<DeployLedger>,
    health_window: Duration,
    health_interval: Duration,
}

impl StandardTaskExecutor {
    pub fn new(
        config: &Config,
        processes: Arc<ProcessManager>,
        health: Arc<HealthChecker>,
        receiver: ArtifactReceiver,
        board: StatusBoard,
        registry: NodeRegistry,
        ledger: Arc<DeployLedger>,
    ) -> Self {
        Self {
            node_id: config.node_id.clone(),
            processes,
            health,
            receiver,
            board,
            registry,
            ledger,
            health_window: config.health_retry_window,
            health_interval: config.health_retry_interval,
        }
    }

    /// Deploy and rollback share one pipeline; only the message differs
    async fn install(&self, task: &Task) -> Result<String> {
        let target = self.installed_path(task);
        let result = self.run_install(task, &target).await;
        self.receiver.discard(&task.task_id).await;

        let status = if result.is_ok() {
            RecordStatus::Success
        } else {
            RecordStatus::Failed
        };
        self.record(task, status, target).await;

        let version = task.version.as_deref().unwrap_or("(unversioned)");
        result.map(|pid| match task.action {
            TaskAction::Rollback => format!(
                "rolled back {} to {} (pid {})",
                task.service_name, version, pid
            ),
            _ => format!("deployed {} {} (pid {})", task.service_name, version, pid),
        })
    }

    async fn run_install(&self, task: &Task, target: &Path) -> Result<u32> {
        let service = task.service_name.as_str();

        let staged = self.receiver.receive(task).await?;
        self.step(task, 30).await;

        if self.processes.is_running(service).await {
            if let Err(e) = self.processes.stop(service).await {
                // The pid file moves with the service dir, so a survivor would go untracked
                if self.processes.is_running(service).await {
                    return Err(Error::process(format!(
                        "{} is still running after stop, not installing over it: {}",
                        service,
                        e.message()
                    )));
                }
                warn!("Failed to stop {} before install, continuing: {}", service, e);
            }
        }
        self.step(task, 45).await;

        self.backup_current(service).await;
        self.install_files(service, &staged, target).await?;
        self.step(task, 60).await;

        let pid = self.processes.start(service).await?;
        self.step(task, 80).await;

        let report = self
            .health
            .verify(service, self.health_window, self.health_interval)
            .await;
        if !report.healthy {
            return Err(Error::process(format!(
                "{} started but failed health checks: {}",
                service,
                report.describe()
            )));
        }
        self.step(task, 95).await;

        Ok(pid)
    }

    /// `<service>.jar` for jars, otherwise a bare executable named after the service
    fn installed_path(&self, task: &Task) -> PathBuf {
        let is_jar = task
            .artifact_locator
            .as_ref()
            .and_then(|l| l.file_name())
            .is_some_and(|n| n.ends_with(".jar"));
        let name = if is_jar {
            format!("{}.jar", task.service_name)
        } else {
            task.service_name.clone()
        };
        self.processes.service_dir(&task.service_name).join(name)
    }

    /// Moves the current install to `.backups/<service>_backup_<millis>`
    async fn backup_current(&self, service: &str) {
        let dir = self.processes.service_dir(service);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return;
        }

        let backups = self.processes.work_dir().join(".backups");
        let dest = backups.join(format!(
            "{}_backup_{}",
            service,
            Utc::now().timestamp_millis()
        ));
        let moved = async {
            tokio::fs::create_dir_all(&backups).await?;
            tokio::fs::rename(&dir, &dest).await
        };
        match moved.await {
            Ok(()) => debug!("Moved {} aside to {}", service, dest.display()),
            Err(e) => {
                warn!("Failed to back up {}, installing over it: {}", service, e);
                return;
            }
        }

        prune_backups(&backups, service).await;
    }

    async fn install_files(&self, service: &str, staged: &Path, target: &Path) -> Result<()> {
        let dir = self.processes.service_dir(service);
        let io_err =
            |what: &str, e: std::io::Error| Error::process(format!("{} for {}: {}", what, service, e));

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_err("failed to create service directory", e))?;
        tokio::fs::copy(staged, target)
            .await
            .map_err(|e| io_err("failed to install artifact", e))?;
        tokio::fs::set_permissions(target, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| io_err("failed to mark artifact executable", e))?;

        let script = dir.join("start.sh");
        tokio::fs::write(&script, start_script(target))
            .await
            .map_err(|e| io_err("failed to write start.sh", e))?;
        tokio::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| io_err("failed to mark start.sh executable", e))?;

        info!("Installed {} into {}", service, dir.display());
        Ok(())
    }

    async fn step(&self, task: &Task, progress: u8) {
        if let Err(e) = self.board.progress(task, &self.node_id, progress).await {
            warn!("Failed to report progress for {}: {}", task.task_id, e);
        }
    }

    async fn record(&self, task: &Task, status: RecordStatus, artifact_path: PathBuf) {
        let now = Utc::now();
        let record = DeployRecord {
            service_name: task.service_name.clone(),
            node_id: self.node_id.clone(),
            task_id: task.task_id.clone(),
            version: task.version.clone(),
            deploy_time: now,
            status,
            operator: task.operator.clone(),
            artifact_path,
            artifact_size: task.artifact_size.unwrap_or(0),
        };

        if let Err(e) = self.registry.record_deploy(&record).await {
            warn!("Failed to record deploy of {}: {}", task.service_name, e);
        }
        if status == RecordStatus::Success {
            self.ledger.record(now, task.version.clone());
        }
    }
}

#[async_trait]
impl TaskExecutor for StandardTaskExecutor {
    async fn execute(&self, task: &Task) -> Result<String> {
        task.validate()?;
        let service = task.service_name.as_str();
        info!("Executing {} for {} ({})", task.action, service, task.task_id);

        match task.action {
            TaskAction::Deploy | TaskAction::Rollback => self.install(task).await,
            TaskAction::Start => {
                let pid = self.processes.start(service).await?;
                Ok(format!("started {} (pid {})", service, pid))
            }
            TaskAction::Stop => {
                self.processes.stop(service).await?;
                Ok(format!("stopped {}", service))
            }
            TaskAction::Restart => {
                let pid = self.processes.restart(service).await?;
                Ok(format!("restarted {} (pid {})", service, pid))
            }
        }
    }
}

fn start_script(target: &Path) -> String {
    let file = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let launch = if file.ends_with(".jar") {
        format!("exec java -jar \"./{}\"", file)
    } else {
        format!("exec \"./{}\"", file)
    };
    format!(
        "#!/bin/sh\n# generated by convoy-agent\ncd \"$(dirname \"$0\")\"\n{}\n",
        launch
    )
}

async fn prune_backups(backups: &Path, service: &str) {
    let prefix = format!("{}_backup_", service);
    let mut found = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(backups).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&prefix) {
                found.push(entry.path());
            }
        }
    }
    found.sort();

    let excess = found.len().saturating_sub(BACKUPS_KEPT);
    for old in found.into_iter().take(excess) {
        if let Err(e) = tokio::fs::remove_dir_all(&old).await {
            warn!("Failed to prune backup {}: {}", old.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use convoy_core::checksum::sha256_bytes;
    use convoy_core::domain::artifact::ArtifactLocator;
    use convoy_core::domain::task::TaskState;
    use convoy_core::keys;
    use convoy_store::{CoordinationStore, MemoryStore, TaskQueue};

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<dyn CoordinationStore>,
        queue: TaskQueue,
        executor: StandardTaskExecutor,
        processes: Arc<ProcessManager>,
        registry: NodeRegistry,
        ledger: Arc<DeployLedger>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.node_id = "n1".to_string();
        config.work_dir = dir.path().to_path_buf();
        config.start_timeout = Duration::from_secs(2);
        config.stop_timeout = Duration::from_secs(2);
        config.health_retry_window = Duration::from_millis(300);
        config.health_retry_interval = Duration::from_millis(50);

        let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
        let queue = TaskQueue::new(store.clone());
        let registry = NodeRegistry::new(store.clone());
        let processes = Arc::new(ProcessManager::new(&config));
        let health = Arc::new(HealthChecker::new(&config, processes.clone()));
        let ledger = Arc::new(DeployLedger::default());
        let executor = StandardTaskExecutor::new(
            &config,
            processes.clone(),
            health,
            ArtifactReceiver::new(&config, store.clone()).unwrap(),
            queue.board().clone(),
            registry.clone(),
            ledger.clone(),
        );

        Fixture {
            _dir: dir,
            store,
            queue,
            executor,
            processes,
            registry,
            ledger,
        }
    }

    async fn inline_task(f: &Fixture, action: TaskAction, script: &str, version: &str) -> Task {
        let name = format!("app_{}.sh", version);
        f.store
            .set(&keys::artifact_blob(&name), &STANDARD.encode(script))
            .await
            .unwrap();
        let task = Task::new(action, "app", vec!["n1".to_string()])
            .with_artifact(
                ArtifactLocator::Inline { name },
                script.len() as u64,
                Some(sha256_bytes(script.as_bytes())),
            )
            .with_version(version);

        f.queue.enqueue(&task).await.unwrap();
        let polled = f
            .queue
            .poll("n1", Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        f.queue.board().mark_running(&polled, "n1").await.unwrap();
        polled
    }

    #[tokio::test]
    async fn test_deploy_installs_starts_and_records() {
        let f = fixture();
        let task = inline_task(&f, TaskAction::Deploy, "#!/bin/sh\nexec sleep 30\n", "v1").await;

        let message = f.executor.execute(&task).await.unwrap();
        assert!(message.starts_with("deployed app v1"));
        assert!(f.processes.is_running("app").await);
        assert!(f.processes.service_dir("app").join("start.sh").exists());

        let record = f.registry.last_deploy("n1", "app").await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Success);
        assert_eq!(record.version.as_deref(), Some("v1"));
        assert_eq!(f.ledger.last().version.as_deref(), Some("v1"));

        let status = f.queue.board().node_status(&task.task_id, "n1").await.unwrap().unwrap();
        assert_eq!(status.status, TaskState::Running);
        assert!(status.progress >= 95);

        // Redeploy moves the previous install aside
        let next = inline_task(&f, TaskAction::Rollback, "#!/bin/sh\nexec sleep 30\n", "v0").await;
        let message = f.executor.execute(&next).await.unwrap();
        assert!(message.starts_with("rolled back app to v0"));
        let backups: Vec<_> = std::fs::read_dir(f.processes.work_dir().join(".backups"))
            .unwrap()
            .collect();
        assert_eq!(backups.len(), 1);

        let stop = Task::new(TaskAction::Stop, "app", vec!["n1".to_string()]);
        assert_eq!(f.executor.execute(&stop).await.unwrap(), "stopped app");
        assert!(!f.processes.is_running("app").await);
    }

    #[tokio::test]
    async fn test_crashing_artifact_fails_and_records_failure() {
        let f = fixture();
        let task = inline_task(&f, TaskAction::Deploy, "#!/bin/sh\nexit 1\n", "v2").await;

        let err = f.executor.execute(&task).await.unwrap_err();
        assert_eq!(err.code(), convoy_core::ErrorCode::ProcessError);

        let record = f.registry.last_deploy("n1", "app").await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Failed);
        assert_eq!(f.ledger.last(), LastDeploy::default());
    }

    #[tokio::test]
    async fn test_path_like_service_is_rejected_before_side_effects() {
        let f = fixture();

        for name in ["../victim", "/etc", "a/b", ".."] {
            for action in [TaskAction::Stop, TaskAction::Start] {
                let task = Task::new(action, name, vec!["n1".to_string()]);
                let err = f.executor.execute(&task).await.unwrap_err();
                assert_eq!(err.code(), convoy_core::ErrorCode::ValidationError);
            }
        }
        assert_eq!(std::fs::read_dir(f.processes.work_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unstoppable_process_fails_deploy_without_backup() {
        let f = fixture();
        let service_dir = f.processes.service_dir("app");
        std::fs::create_dir_all(&service_dir).unwrap();

        // An unreaped child stays a zombie: it answers kill(pid, 0) but never exits
        let mut zombie = std::process::Command::new("true").spawn().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        std::fs::write(f.processes.pid_file("app"), zombie.id().to_string()).unwrap();

        let task = inline_task(&f, TaskAction::Deploy, "#!/bin/sh\nexec sleep 30\n", "v3").await;
        let err = f.executor.execute(&task).await.unwrap_err();
        assert_eq!(err.code(), convoy_core::ErrorCode::ProcessError);
        assert!(err.message().contains("still running after stop"));

        assert!(f.processes.pid_file("app").exists());
        assert!(!f.processes.work_dir().join(".backups").exists());
        assert!(!service_dir.join("start.sh").exists());

        zombie.wait().unwrap();
    }

    #[test]
    fn test_start_script_for_jar() {
        let script = start_script(Path::new("/srv/app/app.jar"));
        assert!(script.contains("exec java -jar \"./app.jar\""));
        let script = start_script(Path::new("/srv/app/app"));
        assert!(script.contains("exec \"./app\""));
    }
}
