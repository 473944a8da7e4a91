//! Deploy command handlers

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use convoy_core::domain::task::TaskState;
use convoy_core::dto::deploy::{BatchDeployResult, DeployRequest};
use std::time::Duration;

use super::task::{print_task_status, wait_for_task};
use crate::config::Config;

/// Deploy subcommands
#[derive(Subcommand)]
pub enum DeployCommands {
    /// Deploy one artifact to a set of nodes
    One {
        /// Service name
        service: String,

        /// Artifact path on the controller
        #[arg(long)]
        artifact: String,

        /// Target node IDs, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        nodes: Vec<String>,

        /// Record a new version even if the checksum matches the current one
        #[arg(long)]
        force: bool,

        #[arg(long)]
        operator: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Wait for the task to finish
        #[arg(long)]
        wait: bool,
    },
    /// Deploy every service in the controller's catalog
    All {
        #[arg(long)]
        operator: Option<String>,
    },
    /// Deploy the named catalog services
    Selected {
        #[arg(required = true)]
        services: Vec<String>,

        #[arg(long)]
        operator: Option<String>,
    },
}

/// Handle deploy commands
pub async fn handle_deploy_command(command: DeployCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        DeployCommands::One {
            service,
            artifact,
            nodes,
            force,
            operator,
            description,
            wait,
        } => {
            let accepted = client
                .deploy(&DeployRequest {
                    service_name: service,
                    artifact_path: artifact,
                    target_nodes: nodes,
                    force_deploy: force,
                    operator,
                    description,
                })
                .await?;

            println!("{}", "✓ Deploy accepted".green().bold());
            println!("  Task:     {}", accepted.task_id.cyan());
            println!("  Service:  {}", accepted.service_name);
            println!("  Method:   {}", accepted.method);
            if let Some(version) = &accepted.version {
                println!("  Version:  {}", version);
            }
            println!("  Nodes:    {}", accepted.target_nodes.join(", "));

            if wait {
                println!();
                let status = wait_for_task(
                    &client,
                    &accepted.task_id,
                    Duration::from_secs(2),
                    Duration::from_secs(900),
                )
                .await?;
                print_task_status(&status);
                if status.status == TaskState::Failed {
                    bail!("deploy of {} failed", accepted.service_name);
                }
            }
            Ok(())
        }
        DeployCommands::All { operator } => {
            let result = client.deploy_all(operator).await?;
            print_batch(&result);
            Ok(())
        }
        DeployCommands::Selected { services, operator } => {
            let result = client.deploy_selected(services, operator).await?;
            print_batch(&result);
            Ok(())
        }
    }
}

fn print_batch(result: &BatchDeployResult) {
    let status = match result.status.as_str() {
        "SUBMITTED" => result.status.green(),
        "PARTIAL" => result.status.yellow(),
        _ => result.status.red(),
    };
    println!(
        "{} {} of {} service(s) submitted",
        status.bold(),
        result.task_ids.len(),
        result.total_services
    );
    for task_id in &result.task_ids {
        println!("  {} {}", "▸".cyan(), task_id);
    }
    for (service, error) in &result.failures {
        println!("  {} {}: {}", "✗".red(), service, error);
    }
}
