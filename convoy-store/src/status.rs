//! Task status board
//!
//! The controller writes an aggregate PENDING record plus one PENDING record
//! per target node at enqueue time. After that each agent only ever writes
//! its own per-node record, so concurrent agents never overwrite each other.
//! Readers fold the per-node records into the aggregate view.

use convoy_core::domain::task::{Task, TaskState, TaskStatus};
use convoy_core::{Error, Result, keys};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::CoordinationStore;
use crate::json::{get_json, set_json_ex, to_json};

#[derive(Clone)]
pub struct StatusBoard {
    store: Arc<dyn CoordinationStore>,
    ttl: Duration,
}

impl StatusBoard {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            ttl: keys::TASK_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Writes the aggregate record and one PENDING record per target node
    pub async fn create_pending(&self, task: &Task) -> Result<()> {
        let aggregate = TaskStatus::pending(task, None);
        set_json_ex(
            self.store.as_ref(),
            &keys::task_status(&task.task_id),
            self.ttl,
            &aggregate,
        )
        .await?;

        for node in &task.target_node_ids {
            let status = TaskStatus::pending(task, Some(node));
            set_json_ex(
                self.store.as_ref(),
                &keys::task_node_status(&task.task_id, node),
                self.ttl,
                &status,
            )
            .await?;
        }
        Ok(())
    }

    /// Reads one node's record, refreshing its TTL
    pub async fn node_status(&self, task_id: &str, node_id: &str) -> Result<Option<TaskStatus>> {
        let key = keys::task_node_status(task_id, node_id);
        let status = get_json(self.store.as_ref(), &key).await?;
        if status.is_some() {
            self.store.expire(&key, self.ttl).await?;
        }
        Ok(status)
    }

    pub async fn mark_running(&self, task: &Task, node_id: &str) -> Result<TaskStatus> {
        self.update(task, node_id, |s| s.transition(TaskState::Running, Some(10)))
            .await
    }

    /// Reports intermediate progress while RUNNING
    pub async fn progress(&self, task: &Task, node_id: &str, progress: u8) -> Result<TaskStatus> {
        self.update(task, node_id, |s| {
            s.transition(TaskState::Running, Some(progress))
        })
        .await
    }

    pub async fn mark_success(
        &self,
        task: &Task,
        node_id: &str,
        message: impl Into<String> + Send,
    ) -> Result<TaskStatus> {
        let message = message.into();
        let status = self
            .update(task, node_id, move |s| s.succeed(message))
            .await?;
        self.publish_event(&status).await;
        Ok(status)
    }

    pub async fn mark_failed(&self, task: &Task, node_id: &str, error: &Error) -> Result<TaskStatus> {
        let status = self.update(task, node_id, |s| s.fail(error)).await?;
        self.publish_event(&status).await;
        Ok(status)
    }

    /// Aggregate view over every target node, refreshing TTLs on read
    pub async fn task_status(&self, task_id: &str) -> Result<Option<TaskStatus>> {
        let key = keys::task_status(task_id);
        let Some(base) = get_json::<TaskStatus>(self.store.as_ref(), &key).await? else {
            return Ok(None);
        };
        self.store.expire(&key, self.ttl).await?;

        let mut nodes = Vec::with_capacity(base.target_nodes.len());
        for node in &base.target_nodes {
            let record = self.node_status(task_id, node).await?;
            nodes.push((node.clone(), record));
        }

        Ok(Some(TaskStatus::aggregate(base, &nodes)))
    }

    /// Batch lookup; unknown ids are skipped
    pub async fn task_statuses(&self, task_ids: &[String]) -> Result<Vec<TaskStatus>> {
        let mut statuses = Vec::with_capacity(task_ids.len());
        for id in task_ids {
            match self.task_status(id).await? {
                Some(status) => statuses.push(status),
                None => debug!("No status record for task {}", id),
            }
        }
        Ok(statuses)
    }

    /// Read-modify-write of one node's record
    ///
    /// A record that has already expired is recreated from the task so the
    /// transition is still validated from PENDING.
    async fn update<F>(&self, task: &Task, node_id: &str, apply: F) -> Result<TaskStatus>
    where
        F: FnOnce(&mut TaskStatus) -> Result<()> + Send,
    {
        let key = keys::task_node_status(&task.task_id, node_id);
        let mut status = match get_json::<TaskStatus>(self.store.as_ref(), &key).await? {
            Some(status) => status,
            None => {
                warn!(
                    "Status record for task {} on {} missing, recreating",
                    task.task_id, node_id
                );
                TaskStatus::pending(task, Some(node_id))
            }
        };

        apply(&mut status)?;
        set_json_ex(self.store.as_ref(), &key, self.ttl, &status).await?;
        Ok(status)
    }

    async fn publish_event(&self, status: &TaskStatus) {
        let payload = match to_json(keys::TASK_EVENTS_CHANNEL, status) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to encode task event: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .store
            .publish(keys::TASK_EVENTS_CHANNEL, &payload)
            .await
        {
            warn!("Failed to publish task event for {}: {}", status.task_id, e);
        }
    }
}
