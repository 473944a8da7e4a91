//! Monitoring DTOs

use serde::{Deserialize, Serialize};

use crate::domain::node::NodeStatus;

/// Node snapshot as seen by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    #[serde(flatten)]
    pub status: NodeStatus,
    /// No heartbeat within three report intervals
    pub stale: bool,
}

/// Batch task status lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusQuery {
    pub task_ids: Vec<String>,
}
