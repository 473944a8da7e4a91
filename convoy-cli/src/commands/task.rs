//! Task command handlers
//!
//! Shows aggregated task status and can wait for a task to finish.

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use convoy_client::ControllerClient;
use convoy_core::domain::task::{TaskState, TaskStatus};
use std::time::Duration;

use crate::config::Config;

/// Task subcommands
#[derive(Subcommand)]
pub enum TaskCommands {
    /// Show one task's status across its nodes
    Get {
        /// Task ID
        id: String,
    },
    /// Show the status of several tasks
    Status {
        /// Task IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Poll a task until it reaches SUCCESS or FAILED
    Watch {
        /// Task ID
        id: String,

        /// Seconds between polls
        #[arg(long, default_value_t = 2)]
        interval: u64,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 600)]
        timeout: u64,
    },
}

/// Handle task commands
pub async fn handle_task_command(command: TaskCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        TaskCommands::Get { id } => {
            let status = client.task_status(&id).await?;
            print_task_status(&status);
            Ok(())
        }
        TaskCommands::Status { ids } => {
            let statuses = client.task_statuses(ids).await?;
            if statuses.is_empty() {
                println!("{}", "No matching tasks found.".yellow());
            }
            for status in &statuses {
                print_task_summary(status);
            }
            Ok(())
        }
        TaskCommands::Watch {
            id,
            interval,
            timeout,
        } => {
            let status = wait_for_task(
                &client,
                &id,
                Duration::from_secs(interval.max(1)),
                Duration::from_secs(timeout),
            )
            .await?;
            print_task_status(&status);
            if status.status == TaskState::Failed {
                bail!("task {} failed", id);
            }
            Ok(())
        }
    }
}

/// Polls until the aggregate status is terminal
pub async fn wait_for_task(
    client: &ControllerClient,
    task_id: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<TaskStatus> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last_progress = None;

    loop {
        let status = client.task_status(task_id).await?;
        if status.status.is_terminal() {
            return Ok(status);
        }
        if last_progress != Some(status.progress) {
            println!(
                "  {} {} {}%",
                "…".dimmed(),
                colorize_state(status.status),
                status.progress
            );
            last_progress = Some(status.progress);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!(
                "task {} still {} after {}s",
                task_id,
                status.status,
                timeout.as_secs()
            );
        }
        tokio::time::sleep(interval).await;
    }
}

pub fn colorize_state(state: TaskState) -> ColoredString {
    let text = state.to_string();
    match state {
        TaskState::Pending => text.yellow(),
        TaskState::Running => text.cyan(),
        TaskState::Success => text.green(),
        TaskState::Failed => text.red(),
    }
}

fn print_task_summary(status: &TaskStatus) {
    println!("  {} {}", "▸".cyan(), status.task_id.dimmed());
    println!("    Service:  {}", status.service_name);
    println!(
        "    Status:   {} ({}%)",
        colorize_state(status.status),
        status.progress
    );
    println!();
}

/// Print detailed task information
pub fn print_task_status(status: &TaskStatus) {
    println!("{}", "Task Details:".bold());
    println!("  ID:       {}", status.task_id.cyan());
    println!("  Service:  {}", status.service_name);
    println!(
        "  Status:   {} ({}%)",
        colorize_state(status.status),
        status.progress
    );
    println!(
        "  Started:  {}",
        status.start_time.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(end) = status.end_time {
        println!("  Finished: {}", end.format("%Y-%m-%d %H:%M:%S"));
        let seconds = end.signed_duration_since(status.start_time).num_seconds();
        println!("  Duration: {}s", seconds);
    }
    if let Some(message) = &status.message {
        println!("  Message:  {}", message);
    }
    if let Some(error) = &status.error_message {
        let code = status
            .error_code
            .map(|c| c.to_string())
            .unwrap_or_default();
        println!("  Error:    {} {}", code.red(), error);
    }

    if !status.per_node_results.is_empty() {
        println!("\n{}", "Nodes:".bold());
        println!("{}", "─".repeat(80).dimmed());
        for (node, result) in &status.per_node_results {
            println!("  {:<20} {}", node.cyan(), result);
        }
        println!("{}", "─".repeat(80).dimmed());
    }
}
