//! Rollback DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Roll one service back; without a target the previous version is used
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub target_version: Option<String>,
    /// Empty means the catalog's target nodes for the service
    #[serde(default)]
    pub target_nodes: Vec<String>,
    pub reason: Option<String>,
    pub operator: Option<String>,
}

/// Roll a subset of the catalog back to each service's previous version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectedRollbackRequest {
    #[serde(default)]
    pub services: Vec<String>,
    pub reason: Option<String>,
    pub operator: Option<String>,
}

/// Outcome of rolling back one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackDetail {
    pub service_name: String,
    pub task_id: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub from_version: Option<String>,
    pub to_version: Option<String>,
    pub rollback_time: DateTime<Utc>,
}

/// Outcome of a batch rollback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResult {
    pub total_services: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub details: Vec<RollbackDetail>,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub operator: Option<String>,
}

impl RollbackResult {
    pub fn from_details(
        details: Vec<RollbackDetail>,
        start_time: DateTime<Utc>,
        operator: Option<String>,
    ) -> Self {
        let success_count = details.iter().filter(|d| d.success).count();
        let failed_count = details.len() - success_count;
        let status = if failed_count == 0 {
            "COMPLETED"
        } else if success_count == 0 {
            "FAILED"
        } else {
            "PARTIAL"
        };
        Self {
            total_services: details.len(),
            success_count,
            failed_count,
            details,
            status: status.to_string(),
            start_time,
            operator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(name: &str, success: bool) -> RollbackDetail {
        RollbackDetail {
            service_name: name.to_string(),
            task_id: None,
            success,
            error_message: None,
            from_version: None,
            to_version: None,
            rollback_time: Utc::now(),
        }
    }

    #[test]
    fn test_result_counts() {
        let result = RollbackResult::from_details(
            vec![detail("a", true), detail("b", false), detail("c", true)],
            Utc::now(),
            None,
        );
        assert_eq!(result.total_services, 3);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.status, "PARTIAL");
    }
}
