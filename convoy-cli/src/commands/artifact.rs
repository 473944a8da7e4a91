//! Artifact command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use convoy_core::dto::artifact::ArtifactInfo;
use std::path::PathBuf;

use crate::config::Config;

/// Artifact subcommands
#[derive(Subcommand)]
pub enum ArtifactCommands {
    /// Resolve a project reference to an artifact on the controller
    Build {
        /// Path, absolute or relative to the controller's artifact root
        project_ref: String,
    },
    /// Upload a local file to the controller
    Upload {
        /// Local artifact file
        file: PathBuf,
    },
}

/// Handle artifact commands
pub async fn handle_artifact_command(command: ArtifactCommands, config: &Config) -> Result<()> {
    let client = config.client();

    let info = match command {
        ArtifactCommands::Build { project_ref } => client.build(&project_ref).await?,
        ArtifactCommands::Upload { file } => {
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("upload path has no file name")?;
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            println!(
                "{}",
                format!("Uploading {} ({} bytes)...", file_name, bytes.len()).dimmed()
            );
            client.upload(&file_name, bytes).await?
        }
    };

    print_artifact(&info);
    Ok(())
}

fn print_artifact(info: &ArtifactInfo) {
    println!("{}", "✓ Artifact ready".green().bold());
    println!("  Path:     {}", info.path.cyan());
    println!("  Size:     {} bytes", info.size);
    println!("  SHA-256:  {}", info.checksum.dimmed());
}
