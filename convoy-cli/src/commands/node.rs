//! Node command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use convoy_core::domain::service::RecordStatus;
use convoy_core::dto::monitor::NodeView;

use super::health::colorize_verdict;
use crate::config::Config;

/// Node subcommands
#[derive(Subcommand)]
pub enum NodeCommands {
    /// List every node that has reported
    List,
    /// Show one node with its services
    Get { node_id: String },
    /// Show deploy history of a service on a node
    Deploys { node_id: String, service: String },
}

/// Handle node commands
pub async fn handle_node_command(command: NodeCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        NodeCommands::List => {
            let nodes = client.list_nodes().await?;
            if nodes.is_empty() {
                println!("{}", "No nodes have reported yet.".yellow());
                return Ok(());
            }
            println!("{}", format!("Found {} node(s):", nodes.len()).bold());
            println!();
            for node in &nodes {
                print_node_summary(node);
            }
            Ok(())
        }
        NodeCommands::Get { node_id } => {
            let node = client.get_node(&node_id).await?;
            print_node_details(&node);
            Ok(())
        }
        NodeCommands::Deploys { node_id, service } => {
            let records = client.deploy_history(&node_id, &service).await?;
            if records.is_empty() {
                println!(
                    "{}",
                    format!("No deploys of {} on {}.", service, node_id).yellow()
                );
                return Ok(());
            }
            for record in records {
                let status = match record.status {
                    RecordStatus::Success => "SUCCESS".green(),
                    RecordStatus::Failed => "FAILED".red(),
                };
                println!(
                    "  {} {:<8} {:<18} {}",
                    record.deploy_time.format("%Y-%m-%d %H:%M:%S"),
                    status,
                    record.version.as_deref().unwrap_or("-"),
                    record.task_id.dimmed()
                );
            }
            Ok(())
        }
    }
}

fn print_node_summary(view: &NodeView) {
    let node = &view.status;
    let stale = if view.stale {
        " (stale)".red().to_string()
    } else {
        String::new()
    };
    println!("  {} {}{}", "▸".cyan(), node.node_id.bold(), stale);
    println!("    Name:      {}", node.node_name);
    println!("    Services:  {}", node.service_status);
    println!("    Health:    {}", colorize_verdict(node.health_status));
    println!(
        "    Heartbeat: {}",
        node.last_heartbeat
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_node_details(view: &NodeView) {
    let node = &view.status;
    println!("{}", "Node Details:".bold());
    println!("  ID:        {}", node.node_id.cyan());
    println!("  Name:      {}", node.node_name);
    println!("  Health:    {}", colorize_verdict(node.health_status));
    println!("  CPU:       {:.1}%", node.cpu_usage);
    println!("  Memory:    {:.1}%", node.memory_usage);
    println!("  Uptime:    {}s", node.uptime_secs);
    println!(
        "  Heartbeat: {}{}",
        node.last_heartbeat.format("%Y-%m-%d %H:%M:%S"),
        if view.stale { " (stale)" } else { "" }
    );
    if let Some(version) = &node.last_deploy_version {
        println!("  Deployed:  {}", version);
    }

    if !node.services.is_empty() {
        println!("\n{}", "Services:".bold());
        println!("{}", "─".repeat(80).dimmed());
        for (name, runtime) in &node.services {
            let health = match runtime.healthy {
                Some(true) => "healthy".green(),
                Some(false) => "unhealthy".red(),
                None => "unknown".dimmed(),
            };
            let pid = runtime
                .pid
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<20} {:<9} pid {:<8} {}",
                name.cyan(),
                runtime.state.to_string(),
                pid,
                health
            );
            if let Some(error) = &runtime.last_error {
                println!("    {}", error.red());
            }
        }
        println!("{}", "─".repeat(80).dimmed());
    }
}
