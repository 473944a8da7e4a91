//! Task domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::artifact::ArtifactLocator;
use crate::error::{Error, ErrorCode, Result};
use crate::keys;

/// Command carried by a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskAction {
    Deploy,
    Rollback,
    Start,
    Stop,
    Restart,
}

impl TaskAction {
    /// Lowercase verb used as the task id prefix
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Rollback => "rollback",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }

    /// Whether the agent must receive an artifact before acting
    pub fn requires_artifact(&self) -> bool {
        matches!(self, Self::Deploy | Self::Rollback)
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb().to_uppercase())
    }
}

impl std::str::FromStr for TaskAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "deploy" => Ok(Self::Deploy),
            "rollback" => Ok(Self::Rollback),
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            other => Err(Error::validation(format!("unknown action '{}'", other))),
        }
    }
}

/// How artifact bytes travel from the controller to the agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DistributionMethod {
    Inline,
    SharedStorage,
    Http,
}

impl fmt::Display for DistributionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inline => "INLINE",
            Self::SharedStorage => "SHARED_STORAGE",
            Self::Http => "HTTP",
        };
        write!(f, "{}", s)
    }
}

/// A command addressed to one or more nodes
///
/// Immutable once enqueued. One copy is pushed onto each target node's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub service_name: String,
    pub action: TaskAction,
    pub distribution_method: Option<DistributionMethod>,
    pub artifact_locator: Option<ArtifactLocator>,
    pub artifact_size: Option<u64>,
    pub checksum: Option<String>,
    pub version: Option<String>,
    pub target_node_ids: Vec<String>,
    pub operator: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Creates a task with an id of the form `<verb>_<service>_<millis>`
    pub fn new(action: TaskAction, service_name: impl Into<String>, targets: Vec<String>) -> Self {
        let service_name = service_name.into();
        let created_at = Utc::now();
        Self {
            task_id: Self::generate_id(action, &service_name, created_at),
            service_name,
            action,
            distribution_method: None,
            artifact_locator: None,
            artifact_size: None,
            checksum: None,
            version: None,
            target_node_ids: targets,
            operator: None,
            created_at,
        }
    }

    pub fn generate_id(action: TaskAction, service_name: &str, at: DateTime<Utc>) -> String {
        format!("{}_{}_{}", action.verb(), service_name, at.timestamp_millis())
    }

    pub fn with_artifact(
        mut self,
        locator: ArtifactLocator,
        size: u64,
        checksum: Option<String>,
    ) -> Self {
        self.distribution_method = Some(locator.method());
        self.artifact_locator = Some(locator);
        self.artifact_size = Some(size);
        self.checksum = checksum;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_operator(mut self, operator: Option<String>) -> Self {
        self.operator = operator;
        self
    }

    /// Checks the structural invariants a task must hold before it is enqueued
    pub fn validate(&self) -> Result<()> {
        keys::validate_segment("task id", &self.task_id)?;
        keys::validate_segment("service name", &self.service_name)?;

        if self.target_node_ids.is_empty() {
            return Err(Error::validation("target node list cannot be empty"));
        }
        for node in &self.target_node_ids {
            keys::validate_segment("node id", node)?;
        }

        if self.action.requires_artifact() {
            let locator = self.artifact_locator.as_ref().ok_or_else(|| {
                Error::validation(format!("{} task requires an artifact locator", self.action))
            })?;
            if self.distribution_method != Some(locator.method()) {
                return Err(Error::validation(
                    "distribution method does not match artifact locator",
                ));
            }
        }

        Ok(())
    }
}

/// Lifecycle state of a task on one node (or aggregated over all nodes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    #[serde(alias = "COMPLETED")]
    Success,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Allowed moves: PENDING -> RUNNING | FAILED, RUNNING -> RUNNING | SUCCESS | FAILED
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Running)
                | (Self::Running, Self::Success)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Status record for a task
///
/// With `node_id` set this is the record one agent owns; without it, it is
/// the aggregate view over every target node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub service_name: String,
    pub node_id: Option<String>,
    pub status: TaskState,
    pub message: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub progress: u8,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub target_nodes: Vec<String>,
    #[serde(default)]
    pub per_node_results: BTreeMap<String, String>,
}

impl TaskStatus {
    /// Initial PENDING record for a task, optionally scoped to one node
    pub fn pending(task: &Task, node_id: Option<&str>) -> Self {
        Self {
            task_id: task.task_id.clone(),
            service_name: task.service_name.clone(),
            node_id: node_id.map(str::to_string),
            status: TaskState::Pending,
            message: None,
            error_code: None,
            error_message: None,
            progress: 0,
            start_time: Utc::now(),
            end_time: None,
            target_nodes: task.target_node_ids.clone(),
            per_node_results: BTreeMap::new(),
        }
    }

    /// Moves to `next`, rejecting illegal transitions and decreasing progress
    pub fn transition(&mut self, next: TaskState, progress: Option<u8>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::conflict(format!(
                "task {}{}: {} -> {} is not allowed",
                self.task_id,
                self.node_suffix(),
                self.status,
                next
            )));
        }

        if let Some(p) = progress {
            let p = p.min(100);
            if p < self.progress {
                return Err(Error::conflict(format!(
                    "task {}{}: progress cannot go from {} to {}",
                    self.task_id,
                    self.node_suffix(),
                    self.progress,
                    p
                )));
            }
            self.progress = p;
        }

        if self.status == TaskState::Pending && next == TaskState::Running {
            self.start_time = Utc::now();
        }
        self.status = next;
        if next.is_terminal() {
            self.end_time = Some(Utc::now());
        }
        if next == TaskState::Success {
            self.progress = 100;
        }
        Ok(())
    }

    /// Terminal SUCCESS with a human-readable message
    pub fn succeed(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(TaskState::Success, Some(100))?;
        self.message = Some(message.into());
        Ok(())
    }

    /// Terminal FAILED carrying the error code and message
    pub fn fail(&mut self, error: &Error) -> Result<()> {
        self.transition(TaskState::Failed, None)?;
        self.error_code = Some(error.code());
        self.error_message = Some(error.message().to_string());
        Ok(())
    }

    /// Short per-node summary, e.g. `FAILED: startup timeout`
    pub fn summary(&self) -> String {
        match (&self.error_message, &self.message) {
            (Some(err), _) if self.status == TaskState::Failed => format!("{}: {}", self.status, err),
            (_, Some(msg)) => format!("{}: {}", self.status, msg),
            _ => self.status.to_string(),
        }
    }

    /// Folds per-node records into the aggregate view
    ///
    /// Nodes whose record is missing count as PENDING. The aggregate is
    /// FAILED if any node failed, SUCCESS if all succeeded, RUNNING once any
    /// node has started, and PENDING otherwise.
    pub fn aggregate(mut base: TaskStatus, nodes: &[(String, Option<TaskStatus>)]) -> TaskStatus {
        base.node_id = None;
        base.per_node_results.clear();

        if nodes.is_empty() {
            return base;
        }

        let mut failures = Vec::new();
        let mut all_success = true;
        let mut any_started = false;
        let mut all_terminal = true;
        let mut progress_sum: u32 = 0;
        let mut latest_end: Option<DateTime<Utc>> = None;

        for (node, record) in nodes {
            match record {
                Some(status) => {
                    base.per_node_results.insert(node.clone(), status.summary());
                    progress_sum += u32::from(status.progress);
                    if status.status != TaskState::Pending {
                        any_started = true;
                    }
                    if status.status != TaskState::Success {
                        all_success = false;
                    }
                    if !status.status.is_terminal() {
                        all_terminal = false;
                    }
                    if status.status == TaskState::Failed {
                        failures.push(format!(
                            "{}: {}",
                            node,
                            status.error_message.as_deref().unwrap_or("failed")
                        ));
                    }
                    if let Some(end) = status.end_time {
                        latest_end = Some(latest_end.map_or(end, |l| l.max(end)));
                    }
                }
                None => {
                    base.per_node_results
                        .insert(node.clone(), TaskState::Pending.to_string());
                    all_success = false;
                    all_terminal = false;
                }
            }
        }

        base.progress = (progress_sum / nodes.len() as u32) as u8;
        base.status = if !failures.is_empty() {
            TaskState::Failed
        } else if all_success {
            TaskState::Success
        } else if any_started {
            TaskState::Running
        } else {
            TaskState::Pending
        };

        if !failures.is_empty() {
            base.error_code = nodes
                .iter()
                .filter_map(|(_, s)| s.as_ref())
                .find(|s| s.status == TaskState::Failed)
                .and_then(|s| s.error_code);
            base.error_message = Some(failures.join("; "));
        }
        base.end_time = if all_terminal { latest_end } else { None };
        base
    }

    fn node_suffix(&self) -> String {
        self.node_id
            .as_ref()
            .map(|n| format!(" on {}", n))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn deploy_task() -> Task {
        Task::new(
            TaskAction::Deploy,
            "svc-a",
            vec!["n1".to_string(), "n2".to_string()],
        )
        .with_artifact(
            ArtifactLocator::Shared {
                path: PathBuf::from("/shared/svc-a.jar"),
            },
            80 * 1024 * 1024,
            None,
        )
    }

    #[test]
    fn test_task_id_format() {
        let task = deploy_task();
        let expected = format!("deploy_svc-a_{}", task.created_at.timestamp_millis());
        assert_eq!(task.task_id, expected);
        assert_eq!(task.distribution_method, Some(DistributionMethod::SharedStorage));
    }

    #[test]
    fn test_task_validation() {
        assert!(deploy_task().validate().is_ok());

        let mut task = deploy_task();
        task.target_node_ids.clear();
        assert!(matches!(task.validate(), Err(Error::Validation(_))));

        let task = Task::new(TaskAction::Deploy, "svc-a", vec!["n1".to_string()]);
        assert!(matches!(task.validate(), Err(Error::Validation(_))));

        let task = Task::new(TaskAction::Restart, "svc-a", vec!["n1".to_string()]);
        assert!(task.validate().is_ok());

        let task = Task::new(TaskAction::Stop, "/etc", vec!["n1".to_string()]);
        assert!(matches!(task.validate(), Err(Error::Validation(_))));
        let task = Task::new(TaskAction::Stop, "../../root", vec!["n1".to_string()]);
        assert!(matches!(task.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("restart".parse::<TaskAction>().unwrap(), TaskAction::Restart);
        assert_eq!("STOP".parse::<TaskAction>().unwrap(), TaskAction::Stop);
        assert!("reboot".parse::<TaskAction>().is_err());
    }

    #[test]
    fn test_state_transitions() {
        use TaskState::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Success));
        assert!(Running.can_transition_to(Success));
        assert!(!Success.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
    }

    #[test]
    fn test_completed_alias() {
        let state: TaskState = serde_json::from_str("\"COMPLETED\"").unwrap();
        assert_eq!(state, TaskState::Success);
        assert_eq!(serde_json::to_string(&state).unwrap(), "\"SUCCESS\"");
    }

    #[test]
    fn test_status_monotonic() {
        let task = deploy_task();
        let mut status = TaskStatus::pending(&task, Some("n1"));

        status.transition(TaskState::Running, Some(10)).unwrap();
        status.transition(TaskState::Running, Some(40)).unwrap();
        assert!(status.transition(TaskState::Running, Some(20)).is_err());

        status.succeed("deployed").unwrap();
        assert_eq!(status.progress, 100);
        assert!(status.end_time.is_some());

        let err = status.fail(&Error::process("late")).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(status.status, TaskState::Success);
    }

    #[test]
    fn test_aggregate_independent_nodes() {
        let task = deploy_task();
        let base = TaskStatus::pending(&task, None);

        let mut n1 = TaskStatus::pending(&task, Some("n1"));
        n1.transition(TaskState::Running, Some(10)).unwrap();
        n1.succeed("ok").unwrap();

        let mut n2 = TaskStatus::pending(&task, Some("n2"));
        n2.transition(TaskState::Running, Some(10)).unwrap();

        let view = TaskStatus::aggregate(
            base.clone(),
            &[("n1".to_string(), Some(n1.clone())), ("n2".to_string(), Some(n2.clone()))],
        );
        assert_eq!(view.status, TaskState::Running);
        assert_eq!(view.per_node_results["n1"], "SUCCESS: ok");
        assert_eq!(view.per_node_results["n2"], "RUNNING");
        assert!(view.end_time.is_none());

        n2.fail(&Error::process("startup timeout")).unwrap();
        let view = TaskStatus::aggregate(
            base,
            &[("n1".to_string(), Some(n1)), ("n2".to_string(), Some(n2))],
        );
        assert_eq!(view.status, TaskState::Failed);
        assert_eq!(view.error_code, Some(ErrorCode::ProcessError));
        assert_eq!(view.error_message.as_deref(), Some("n2: startup timeout"));
        assert!(view.end_time.is_some());
    }

    #[test]
    fn test_aggregate_missing_record_is_pending() {
        let task = deploy_task();
        let view = TaskStatus::aggregate(
            TaskStatus::pending(&task, None),
            &[("n1".to_string(), None), ("n2".to_string(), None)],
        );
        assert_eq!(view.status, TaskState::Pending);
        assert_eq!(view.per_node_results.len(), 2);
    }
}
