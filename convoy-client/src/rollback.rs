//! Rollback and version endpoints

use convoy_core::domain::service::{RollbackHistory, ServiceVersion};
use convoy_core::dto::rollback::{
    RollbackDetail, RollbackRequest, RollbackResult, SelectedRollbackRequest,
};

use crate::ControllerClient;
use crate::error::Result;

impl ControllerClient {
    // =============================================================================
    // Rollback
    // =============================================================================

    /// Roll one service back; blocks until the agents report or time runs out
    pub async fn rollback(&self, service: &str, req: &RollbackRequest) -> Result<RollbackDetail> {
        let url = self.url(&format!("/api/rollback/{}", service));
        let response = self.client.post(&url).json(req).send().await?;

        self.handle_response(response).await
    }

    /// Roll every catalog service back to its previous version
    pub async fn rollback_all(&self, req: &RollbackRequest) -> Result<RollbackResult> {
        let response = self
            .client
            .post(self.url("/api/rollback/all"))
            .json(req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn rollback_selected(&self, req: &SelectedRollbackRequest) -> Result<RollbackResult> {
        let response = self
            .client
            .post(self.url("/api/rollback/selected"))
            .json(req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn rollback_history(&self, service: &str) -> Result<Vec<RollbackHistory>> {
        let url = self.url(&format!("/api/rollback/{}/history", service));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Versions newest first, current one flagged
    pub async fn versions(&self, service: &str) -> Result<Vec<ServiceVersion>> {
        let url = self.url(&format!("/api/services/{}/versions", service));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
