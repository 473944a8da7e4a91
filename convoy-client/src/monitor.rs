//! Node and health monitoring endpoints

use convoy_core::domain::node::HealthStatus;
use convoy_core::domain::service::DeployRecord;
use convoy_core::dto::monitor::NodeView;

use crate::ControllerClient;
use crate::error::Result;

impl ControllerClient {
    // =============================================================================
    // Monitoring
    // =============================================================================

    /// Controller liveness
    pub async fn health_check(&self) -> Result<()> {
        let response = self.client.get(self.url("/health")).send().await?;
        self.handle_empty_response(response).await
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeView>> {
        let response = self.client.get(self.url("/api/nodes")).send().await?;
        self.handle_response(response).await
    }

    pub async fn get_node(&self, node_id: &str) -> Result<NodeView> {
        let url = self.url(&format!("/api/nodes/{}", node_id));
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    pub async fn node_health(&self, node_id: &str) -> Result<HealthStatus> {
        let url = self.url(&format!("/api/nodes/{}/health", node_id));
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    /// Latest health snapshot of every node
    pub async fn all_health(&self) -> Result<Vec<HealthStatus>> {
        let response = self.client.get(self.url("/api/health")).send().await?;
        self.handle_response(response).await
    }

    /// Deploy records of one service on one node, newest first
    pub async fn deploy_history(&self, node_id: &str, service: &str) -> Result<Vec<DeployRecord>> {
        let url = self.url(&format!("/api/nodes/{}/services/{}/deploys", node_id, service));
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }
}
