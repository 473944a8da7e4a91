//! Service lifecycle, version and history types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of a managed service on one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "STOPPED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Agent-local runtime view of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRuntime {
    pub service_name: String,
    pub state: ServiceState,
    pub pid: Option<u32>,
    pub pid_file: PathBuf,
    pub running: bool,
    pub healthy: Option<bool>,
    pub last_error: Option<String>,
}

/// One deployable version of a service, as recorded by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceVersion {
    pub version: String,
    pub artifact_path: PathBuf,
    pub file_size: u64,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    /// Derived from the current-version pointer on read
    #[serde(default)]
    pub is_current: bool,
    pub description: Option<String>,
}

/// Outcome stored in deploy and rollback history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Success,
    Failed,
}

/// Completed deploy on one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployRecord {
    pub service_name: String,
    pub node_id: String,
    pub task_id: String,
    pub version: Option<String>,
    pub deploy_time: DateTime<Utc>,
    pub status: RecordStatus,
    pub operator: Option<String>,
    pub artifact_path: PathBuf,
    pub artifact_size: u64,
}

/// Completed controller-driven rollback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackHistory {
    pub service_name: String,
    pub task_id: Option<String>,
    pub from_version: Option<String>,
    pub to_version: String,
    pub reason: Option<String>,
    pub operator: Option<String>,
    pub rollback_time: DateTime<Utc>,
    pub status: RecordStatus,
    pub message: Option<String>,
}
