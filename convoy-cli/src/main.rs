//! Convoy CLI
//!
//! Command-line interface for the Convoy controller.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "convoy")]
#[command(about = "Convoy deployment CLI", long_about = None)]
struct Cli {
    /// Controller URL
    #[arg(
        long,
        env = "CONVOY_CONTROLLER_URL",
        default_value = "http://localhost:8080"
    )]
    controller_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        controller_url: cli.controller_url,
    };

    handle_command(cli.command, &config).await
}
