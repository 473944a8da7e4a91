//! Monitor Service
//!
//! Read-only fleet views built from the snapshots agents push.

use chrono::Utc;
use convoy_core::domain::node::HealthStatus;
use convoy_core::domain::service::DeployRecord;
use convoy_core::dto::monitor::NodeView;
use convoy_core::{Error, Result};
use convoy_store::NodeRegistry;
use std::time::Duration;

pub struct MonitorService {
    registry: NodeRegistry,
    stale_after: Duration,
}

impl MonitorService {
    pub fn new(registry: NodeRegistry, stale_after: Duration) -> Self {
        Self {
            registry,
            stale_after,
        }
    }

    pub async fn nodes(&self) -> Result<Vec<NodeView>> {
        let now = Utc::now();
        Ok(self
            .registry
            .all_node_status()
            .await?
            .into_iter()
            .map(|status| NodeView {
                stale: status.is_stale(now, self.stale_after),
                status,
            })
            .collect())
    }

    pub async fn node(&self, node_id: &str) -> Result<NodeView> {
        let status = self
            .registry
            .node_status(node_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("node {} not found", node_id)))?;
        Ok(NodeView {
            stale: status.is_stale(Utc::now(), self.stale_after),
            status,
        })
    }

    pub async fn node_health(&self, node_id: &str) -> Result<HealthStatus> {
        self.registry
            .health_status(node_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("no health report for node {}", node_id)))
    }

    pub async fn health(&self) -> Result<Vec<HealthStatus>> {
        self.registry.all_health_status().await
    }

    pub async fn deploy_history(&self, node_id: &str, service: &str) -> Result<Vec<DeployRecord>> {
        self.registry.deploy_history(node_id, service).await
    }
}
