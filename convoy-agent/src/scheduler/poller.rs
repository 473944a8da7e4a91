//! Task poller
//!
//! Long-polls this node's queue with a bounded blocking pop and runs each
//! task in its own tokio task, bounded by a semaphore. Errors and panics in
//! a handler become a FAILED status for that (task, node) pair; they never
//! stop the loop.

use anyhow::{Context, Result};
use convoy_core::Error;
use convoy_core::domain::task::Task;
use convoy_store::{StatusBoard, TaskQueue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::service::TaskExecutor;

/// Task poller that continuously pops and executes tasks
pub struct TaskPoller {
    node_id: String,
    poll_timeout: Duration,
    max_parallel: usize,
    queue: TaskQueue,
    executor: Arc<dyn TaskExecutor>,
    semaphore: Arc<Semaphore>,
}

impl TaskPoller {
    /// Creates a new task poller
    pub fn new(config: &Config, queue: TaskQueue, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            node_id: config.node_id.clone(),
            poll_timeout: config.poll_timeout,
            max_parallel: config.max_parallel_tasks,
            queue,
            executor,
            semaphore: Arc::new(Semaphore::new(config.max_parallel_tasks)),
        }
    }

    /// Polls until `shutdown` flips, then waits for running tasks
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "Starting task poller for node {} (timeout: {:?}, parallel: {})",
            self.node_id, self.poll_timeout, self.max_parallel
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Only pop what we can run right away
            let permit = tokio::select! {
                permit = self.semaphore.clone().acquire_owned() => {
                    permit.context("Task semaphore closed")?
                }
                _ = shutdown.changed() => break,
            };

            if let Err(e) = self.poll_once(permit).await {
                error!("Error during poll cycle: {:#}", e);
                tokio::time::sleep(self.poll_timeout).await;
            }
        }

        info!("Poller stopping, waiting for running tasks");
        let _drained = self
            .semaphore
            .acquire_many(self.max_parallel as u32)
            .await
            .context("Task semaphore closed")?;
        Ok(())
    }

    /// Pops at most one task and spawns its execution
    pub async fn poll_once(&self, permit: OwnedSemaphorePermit) -> Result<Option<JoinHandle<()>>> {
        let task = self
            .queue
            .poll(&self.node_id, self.poll_timeout)
            .await
            .context("Failed to poll task queue")?;

        let Some(task) = task else {
            debug!("No task available");
            return Ok(None);
        };

        info!(
            "Received task {} ({} {})",
            task.task_id, task.action, task.service_name
        );
        Ok(Some(self.spawn_task(task, permit)))
    }

    /// Spawns a task to execute a single task
    fn spawn_task(&self, task: Task, permit: OwnedSemaphorePermit) -> JoinHandle<()> {
        let board = self.queue.board().clone();
        let executor = Arc::clone(&self.executor);
        let node_id = self.node_id.clone();

        tokio::spawn(async move {
            let _permit = permit;
            Self::handle_task(task, node_id, board, executor).await;
        })
    }

    async fn handle_task(
        task: Task,
        node_id: String,
        board: StatusBoard,
        executor: Arc<dyn TaskExecutor>,
    ) {
        if let Err(e) = board.mark_running(&task, &node_id).await {
            if matches!(e, Error::Conflict(_)) {
                warn!("Skipping task {}: {}", task.task_id, e);
                return;
            }
            warn!("Failed to mark task {} running: {}", task.task_id, e);
        }

        let run = {
            let task = task.clone();
            tokio::spawn(async move { executor.execute(&task).await })
        };

        let outcome = match run.await {
            Ok(result) => result,
            Err(e) => Err(Error::process(describe_join_error(e))),
        };

        let written = match &outcome {
            Ok(message) => {
                info!("Task {} succeeded: {}", task.task_id, message);
                board.mark_success(&task, &node_id, message.clone()).await
            }
            Err(e) => {
                error!("Task {} failed: {}", task.task_id, e);
                board.mark_failed(&task, &node_id, e).await
            }
        };

        if let Err(e) = written {
            error!("Failed to write final status for {}: {}", task.task_id, e);
        }
    }
}

fn describe_join_error(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("task handler aborted: {}", err);
    }
    let payload = err.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("task handler panicked: {}", detail)
}
