//! Health command handler

use anyhow::Result;
use colored::*;
use convoy_core::domain::node::{HealthStatus, HealthVerdict};

use crate::config::Config;

/// Show health of one node, or of every node
pub async fn show_health(node: Option<String>, config: &Config) -> Result<()> {
    let client = config.client();

    let statuses = match node {
        Some(node_id) => vec![client.node_health(&node_id).await?],
        None => client.all_health().await?,
    };

    if statuses.is_empty() {
        println!("{}", "No health reports yet.".yellow());
        return Ok(());
    }

    for status in &statuses {
        print_health(status);
    }
    Ok(())
}

pub fn colorize_verdict(verdict: HealthVerdict) -> ColoredString {
    let text = verdict.to_string();
    match verdict {
        HealthVerdict::Healthy => text.green(),
        HealthVerdict::Unhealthy => text.red(),
        HealthVerdict::Unknown => text.yellow(),
    }
}

fn print_health(status: &HealthStatus) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        status.node_id.bold(),
        colorize_verdict(status.status)
    );
    println!(
        "    Checked: {}",
        status
            .check_time
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!("    {}", status.message);

    for report in &status.reports {
        let mark = if report.healthy {
            "✓".green()
        } else {
            "✗".red()
        };
        println!("    {} {}", mark, report.service_name);
        for signal in report.failed() {
            println!("        {}: {}", signal.signal, signal.detail.red());
        }
    }
    println!();
}
