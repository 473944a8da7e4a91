//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod artifact;
mod deploy;
mod health;
mod node;
mod rollback;
mod service;
mod task;

pub use artifact::ArtifactCommands;
pub use deploy::DeployCommands;
pub use node::NodeCommands;
pub use rollback::RollbackCommands;
pub use service::ServiceCommands;
pub use task::TaskCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    #[command(flatten)]
    Artifact(ArtifactCommands),
    /// Deploy services
    Deploy {
        #[command(subcommand)]
        command: DeployCommands,
    },
    /// Roll services back and inspect versions
    Rollback {
        #[command(subcommand)]
        command: RollbackCommands,
    },
    /// Start, stop or restart a service
    Service {
        #[command(subcommand)]
        command: ServiceCommands,
    },
    /// Inspect task status
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Inspect nodes
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },
    /// Show node health
    Health {
        /// Only this node
        node: Option<String>,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Artifact(command) => artifact::handle_artifact_command(command, config).await,
        Commands::Deploy { command } => deploy::handle_deploy_command(command, config).await,
        Commands::Rollback { command } => rollback::handle_rollback_command(command, config).await,
        Commands::Service { command } => service::handle_service_command(command, config).await,
        Commands::Task { command } => task::handle_task_command(command, config).await,
        Commands::Node { command } => node::handle_node_command(command, config).await,
        Commands::Health { node } => health::show_health(node, config).await,
    }
}
