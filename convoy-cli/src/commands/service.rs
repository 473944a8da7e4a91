//! Service command handlers

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use convoy_core::domain::task::{TaskAction, TaskState};
use convoy_core::dto::deploy::{ServiceCommandRequest, ServiceSummary};
use std::time::Duration;

use super::task::{print_task_status, wait_for_task};
use crate::config::Config;

/// Service subcommands
#[derive(Subcommand)]
pub enum ServiceCommands {
    /// List the controller's service catalog
    List,
    /// Start a service
    Start(ServiceTarget),
    /// Stop a service
    Stop(ServiceTarget),
    /// Restart a service
    Restart(ServiceTarget),
}

#[derive(clap::Args)]
pub struct ServiceTarget {
    service: String,

    /// Target node IDs, comma separated; defaults to the catalog's nodes
    #[arg(long, value_delimiter = ',')]
    nodes: Vec<String>,

    #[arg(long)]
    operator: Option<String>,

    /// Wait until every node reports a final status
    #[arg(long)]
    wait: bool,
}

/// Handle service commands
pub async fn handle_service_command(command: ServiceCommands, config: &Config) -> Result<()> {
    let client = config.client();

    let (action, target) = match command {
        ServiceCommands::List => {
            let services = client.services().await?;
            print_catalog(&services);
            return Ok(());
        }
        ServiceCommands::Start(target) => (TaskAction::Start, target),
        ServiceCommands::Stop(target) => (TaskAction::Stop, target),
        ServiceCommands::Restart(target) => (TaskAction::Restart, target),
    };

    let accepted = client
        .service_command(
            &target.service,
            action,
            &ServiceCommandRequest {
                target_nodes: target.nodes,
                operator: target.operator,
            },
        )
        .await?;

    println!(
        "{} {} {}",
        "✓".green(),
        action.to_string().bold(),
        target.service
    );
    println!("  Task: {}", accepted.task_id.cyan());

    if !target.wait {
        println!(
            "{}",
            format!("  Follow with: convoy task watch {}", accepted.task_id).dimmed()
        );
        return Ok(());
    }

    println!();
    let status = wait_for_task(
        &client,
        &accepted.task_id,
        Duration::from_secs(1),
        Duration::from_secs(300),
    )
    .await?;
    print_task_status(&status);
    if status.status == TaskState::Failed {
        bail!("{} of {} failed", action.verb(), target.service);
    }
    Ok(())
}

fn print_catalog(services: &[ServiceSummary]) {
    if services.is_empty() {
        println!("{}", "No services configured".yellow());
        return;
    }

    println!("{}", "Services:".bold());
    for svc in services {
        println!("  {} -> {}", svc.name.cyan(), svc.target_nodes.join(", "));
        println!("    {} {}", "artifact:".dimmed(), svc.artifact_path);
        if let Some(desc) = &svc.description {
            println!("    {}", desc.dimmed());
        }
    }
}
