//! Deploy DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::task::DistributionMethod;
use crate::error::{Error, Result};
use crate::keys;

/// Request to deploy one artifact to a set of nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub service_name: String,
    pub artifact_path: String,
    pub target_nodes: Vec<String>,
    #[serde(default)]
    pub force_deploy: bool,
    pub operator: Option<String>,
    pub description: Option<String>,
}

impl DeployRequest {
    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(Error::validation("service name cannot be empty"));
        }
        keys::validate_segment("service name", &self.service_name)?;

        if self.artifact_path.trim().is_empty() {
            return Err(Error::validation("artifact path cannot be empty"));
        }

        if self.target_nodes.is_empty() {
            return Err(Error::validation("target node list cannot be empty"));
        }
        for node in &self.target_nodes {
            keys::validate_segment("node id", node)?;
        }

        Ok(())
    }
}

/// Deploy every service in the controller's catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchDeployRequest {
    pub operator: Option<String>,
}

/// Deploy a subset of the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedDeployRequest {
    pub services: Vec<String>,
    pub operator: Option<String>,
}

/// Returned once a deploy task has been enqueued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployAccepted {
    pub task_id: String,
    pub service_name: String,
    pub method: DistributionMethod,
    pub version: Option<String>,
    pub target_nodes: Vec<String>,
}

/// Result of a batch deploy; per-service tasks complete independently
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDeployResult {
    pub total_services: usize,
    pub task_ids: Vec<String>,
    #[serde(default)]
    pub failures: BTreeMap<String, String>,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub operator: Option<String>,
}

/// Start, stop or restart a service on some nodes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceCommandRequest {
    /// Empty means the catalog's target nodes for the service
    #[serde(default)]
    pub target_nodes: Vec<String>,
    pub operator: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAccepted {
    pub task_id: String,
}

/// One entry of the controller's service catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub name: String,
    pub artifact_path: String,
    pub target_nodes: Vec<String>,
    pub description: Option<String>,
}
