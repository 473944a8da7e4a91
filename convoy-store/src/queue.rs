//! Task queue
//!
//! One list per node (`task:queue:<node>`). The controller LPUSHes a copy of
//! the task for every target node; each agent BRPOPs its own list, so tasks
//! are consumed in FIFO order and at most once per enqueue.

use convoy_core::domain::task::Task;
use convoy_core::{Result, keys};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::CoordinationStore;
use crate::error::StoreError;
use crate::json::to_json;
use crate::status::StatusBoard;

#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<dyn CoordinationStore>,
    board: StatusBoard,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        let board = StatusBoard::new(Arc::clone(&store));
        Self { store, board }
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    /// Validates the task, writes PENDING statuses, then pushes one copy per node
    ///
    /// Statuses are written first so an agent that pops the task immediately
    /// always finds its PENDING record.
    pub async fn enqueue(&self, task: &Task) -> Result<()> {
        task.validate()?;
        self.board.create_pending(task).await?;

        let payload = to_json(&task.task_id, task)?;
        for node in &task.target_node_ids {
            let queue = keys::task_queue(node);
            self.store.lpush(&queue, &payload).await?;
            self.store.expire(&queue, keys::QUEUE_TTL).await?;
            debug!("Queued task {} on {}", task.task_id, queue);
        }

        info!(
            "Enqueued {} task {} for {} on {} node(s)",
            task.action,
            task.task_id,
            task.service_name,
            task.target_node_ids.len()
        );
        Ok(())
    }

    /// Waits up to `timeout` for the next task addressed to `node_id`
    pub async fn poll(&self, node_id: &str, timeout: Duration) -> Result<Option<Task>> {
        let queue = keys::task_queue(node_id);
        let Some(raw) = self.store.brpop(&queue, timeout).await? else {
            return Ok(None);
        };

        let task = serde_json::from_str(&raw).map_err(|e| StoreError::serialization(&queue, e))?;
        Ok(Some(task))
    }

    /// Number of tasks waiting for a node
    pub async fn depth(&self, node_id: &str) -> Result<usize> {
        Ok(self
            .store
            .lrange(&keys::task_queue(node_id), 0, -1)
            .await?
            .len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use convoy_core::Error;
    use convoy_core::domain::artifact::ArtifactLocator;
    use convoy_core::domain::task::{TaskAction, TaskState};
    use std::path::PathBuf;

    fn queue() -> (Arc<MemoryStore>, TaskQueue) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), TaskQueue::new(store))
    }

    fn deploy_task(nodes: &[&str]) -> Task {
        Task::new(
            TaskAction::Deploy,
            "svc-a",
            nodes.iter().map(|n| n.to_string()).collect(),
        )
        .with_artifact(
            ArtifactLocator::Shared {
                path: PathBuf::from("/mnt/shared/svc-a.jar"),
            },
            80 * 1024 * 1024,
            Some("abc123".to_string()),
        )
        .with_version("v1700000000000")
        .with_operator(Some("ops".to_string()))
    }

    #[tokio::test]
    async fn test_enqueue_poll_preserves_task() {
        let (_store, queue) = queue();
        let task = deploy_task(&["n1"]);
        queue.enqueue(&task).await.unwrap();

        let polled = queue
            .poll("n1", Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(polled, task);
    }

    #[tokio::test]
    async fn test_one_copy_per_node() {
        let (_store, queue) = queue();
        let task = deploy_task(&["n1", "n2"]);
        queue.enqueue(&task).await.unwrap();

        assert_eq!(queue.depth("n1").await.unwrap(), 1);
        assert_eq!(queue.depth("n2").await.unwrap(), 1);
        assert_eq!(queue.depth("n3").await.unwrap(), 0);

        for node in ["n1", "n2"] {
            let status = queue
                .board()
                .node_status(&task.task_id, node)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(status.status, TaskState::Pending);
        }
    }

    #[tokio::test]
    async fn test_poll_is_fifo_and_consumes() {
        let (_store, queue) = queue();
        let first = Task::new(TaskAction::Stop, "svc-a", vec!["n1".to_string()]);
        let mut second = Task::new(TaskAction::Start, "svc-a", vec!["n1".to_string()]);
        second.task_id = format!("{}_2", second.task_id);

        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();

        let timeout = Duration::from_millis(50);
        assert_eq!(queue.poll("n1", timeout).await.unwrap().unwrap().task_id, first.task_id);
        assert_eq!(queue.poll("n1", timeout).await.unwrap().unwrap().task_id, second.task_id);
        assert!(queue.poll("n1", timeout).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_task_not_enqueued() {
        let (_store, queue) = queue();
        let task = Task::new(TaskAction::Deploy, "svc-a", vec!["n1".to_string()]);

        let err = queue.enqueue(&task).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(queue.depth("n1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_message_is_transport_error() {
        let (store, queue) = queue();
        store.lpush(&keys::task_queue("n1"), "{not json").await.unwrap();

        let err = queue
            .poll("n1", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
