//! Rollback command handlers

use anyhow::{Result, bail};
use clap::Subcommand;
use colored::*;
use convoy_core::dto::rollback::{
    RollbackDetail, RollbackRequest, RollbackResult, SelectedRollbackRequest,
};

use crate::config::Config;

/// Rollback subcommands
#[derive(Subcommand)]
pub enum RollbackCommands {
    /// Roll one service back (to the previous version unless --to is given)
    Service {
        service: String,

        /// Target version
        #[arg(long = "to")]
        target_version: Option<String>,

        /// Target node IDs, comma separated; defaults to the catalog's nodes
        #[arg(long, value_delimiter = ',')]
        nodes: Vec<String>,

        #[arg(long)]
        reason: Option<String>,

        #[arg(long)]
        operator: Option<String>,
    },
    /// Roll every catalog service back to its previous version
    All {
        #[arg(long)]
        reason: Option<String>,

        #[arg(long)]
        operator: Option<String>,
    },
    /// Roll the named services back to their previous versions
    Selected {
        #[arg(required = true)]
        services: Vec<String>,

        #[arg(long)]
        reason: Option<String>,

        #[arg(long)]
        operator: Option<String>,
    },
    /// Show rollback history of a service
    History { service: String },
    /// List recorded versions of a service
    Versions { service: String },
}

/// Handle rollback commands
pub async fn handle_rollback_command(command: RollbackCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        RollbackCommands::Service {
            service,
            target_version,
            nodes,
            reason,
            operator,
        } => {
            println!(
                "{}",
                format!("Rolling back {} and waiting for agents...", service).dimmed()
            );
            let detail = client
                .rollback(
                    &service,
                    &RollbackRequest {
                        target_version,
                        target_nodes: nodes,
                        reason,
                        operator,
                    },
                )
                .await?;
            print_detail(&detail);
            if !detail.success {
                bail!("rollback of {} failed", service);
            }
            Ok(())
        }
        RollbackCommands::All { reason, operator } => {
            let result = client
                .rollback_all(&RollbackRequest {
                    reason,
                    operator,
                    ..Default::default()
                })
                .await?;
            print_result(&result);
            Ok(())
        }
        RollbackCommands::Selected {
            services,
            reason,
            operator,
        } => {
            let result = client
                .rollback_selected(&SelectedRollbackRequest {
                    services,
                    reason,
                    operator,
                })
                .await?;
            print_result(&result);
            Ok(())
        }
        RollbackCommands::History { service } => {
            let history = client.rollback_history(&service).await?;
            if history.is_empty() {
                println!("{}", format!("No rollbacks recorded for {}.", service).yellow());
                return Ok(());
            }
            println!("{}", format!("Rollback history of {}:", service).bold());
            println!("{}", "─".repeat(80).dimmed());
            for entry in history {
                println!(
                    "  {} {:?} {} → {}  {}",
                    entry.rollback_time.format("%Y-%m-%d %H:%M:%S"),
                    entry.status,
                    entry.from_version.as_deref().unwrap_or("-"),
                    entry.to_version,
                    entry.message.as_deref().unwrap_or("").dimmed()
                );
            }
            println!("{}", "─".repeat(80).dimmed());
            Ok(())
        }
        RollbackCommands::Versions { service } => {
            let versions = client.versions(&service).await?;
            if versions.is_empty() {
                println!("{}", format!("No versions recorded for {}.", service).yellow());
                return Ok(());
            }
            println!("{}", format!("Versions of {}:", service).bold());
            for version in versions {
                let marker = if version.is_current {
                    "●".green()
                } else {
                    " ".normal()
                };
                println!(
                    "  {} {:<18} {:>12} bytes  {}  {}",
                    marker,
                    version.version,
                    version.file_size,
                    version.created_at.format("%Y-%m-%d %H:%M:%S"),
                    version.description.as_deref().unwrap_or("").dimmed()
                );
            }
            Ok(())
        }
    }
}

fn print_detail(detail: &RollbackDetail) {
    let mark = if detail.success {
        "✓".green()
    } else {
        "✗".red()
    };
    println!(
        "  {} {} {} → {}",
        mark,
        detail.service_name.bold(),
        detail.from_version.as_deref().unwrap_or("-"),
        detail.to_version.as_deref().unwrap_or("-")
    );
    if let Some(task_id) = &detail.task_id {
        println!("    Task:  {}", task_id.dimmed());
    }
    if let Some(error) = &detail.error_message {
        println!("    Error: {}", error.red());
    }
}

fn print_result(result: &RollbackResult) {
    println!(
        "{} {} succeeded, {} failed of {}",
        result.status.bold(),
        result.success_count,
        result.failed_count,
        result.total_services
    );
    for detail in &result.details {
        print_detail(detail);
    }
}
