//! Coordination store key conventions
//!
//! All keys are colon-separated, and agents also use service names as
//! directory names, so identifiers are limited to `[A-Za-z0-9._-]` without
//! a leading dot (see [`validate_segment`]).

use std::time::Duration;

use crate::error::{Error, Result};

/// Node and health snapshots (60 days)
pub const MONITOR_TTL: Duration = Duration::from_secs(60 * 24 * 3600);
/// Task status records (1 hour)
pub const TASK_TTL: Duration = Duration::from_secs(3600);
/// Queued task messages and inline blobs (1 hour)
pub const QUEUE_TTL: Duration = Duration::from_secs(3600);
/// Version, deploy and rollback history (180 days)
pub const HISTORY_TTL: Duration = Duration::from_secs(180 * 24 * 3600);
/// Deploy history entries kept per (node, service)
pub const DEPLOY_HISTORY_LIMIT: usize = 50;

/// Set of every node id that has pushed a snapshot
pub const NODE_LIST: &str = "node:list";
/// Pub/sub channel for task completion events
pub const TASK_EVENTS_CHANNEL: &str = "task:events";

pub fn task_queue(node_id: &str) -> String {
    format!("task:queue:{}", node_id)
}

/// Aggregate status record written by the controller at enqueue time
pub fn task_status(task_id: &str) -> String {
    format!("task:status:{}", task_id)
}

/// Per-node status record owned by the agent executing the task
pub fn task_node_status(task_id: &str, node_id: &str) -> String {
    format!("task:status:{}:{}", task_id, node_id)
}

pub fn node_status(node_id: &str) -> String {
    format!("node:status:{}", node_id)
}

pub fn health_status(node_id: &str) -> String {
    format!("health:status:{}", node_id)
}

pub fn deploy_info(node_id: &str, service: &str) -> String {
    format!("service:deploy:{}:{}", node_id, service)
}

pub fn deploy_history(node_id: &str, service: &str) -> String {
    format!("deploy:history:{}:{}", node_id, service)
}

pub fn service_versions(service: &str) -> String {
    format!("service:versions:{}", service)
}

pub fn current_version(service: &str) -> String {
    format!("service:version:{}:current", service)
}

pub fn rollback_history(service: &str) -> String {
    format!("rollback:history:{}", service)
}

pub fn artifact_blob(name: &str) -> String {
    format!("artifact:blob:{}", name)
}

pub fn artifact_receipts(name: &str) -> String {
    format!("artifact:receipts:{}", name)
}

/// Rejects identifiers that would break key parsing or escape a directory
///
/// Allowed: ASCII letters, digits, `.`, `_` and `-`, not starting with `.`.
/// This also rules out `.`, `..`, path separators and absolute paths.
pub fn validate_segment(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", kind)));
    }
    if value.starts_with('.') {
        return Err(Error::validation(format!(
            "{} '{}' must not start with '.'",
            kind, value
        )));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(Error::validation(format!(
            "{} '{}' contains '{}'; only letters, digits, '.', '_' and '-' are allowed",
            kind, value, bad
        )));
    }
    Ok(())
}
