//! Artifact DTOs

use serde::{Deserialize, Serialize};

/// Ask the build provider to turn a project reference into an artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    pub project_ref: String,
}

/// An artifact available to the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub path: String,
    pub file_name: String,
    pub size: u64,
    pub checksum: String,
}
