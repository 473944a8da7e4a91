//! Deploy, service command and task status endpoints

use convoy_core::domain::task::{TaskAction, TaskStatus};
use convoy_core::dto::deploy::{
    BatchDeployRequest, BatchDeployResult, DeployAccepted, DeployRequest, SelectedDeployRequest,
    ServiceCommandRequest, ServiceSummary, TaskAccepted,
};
use convoy_core::dto::monitor::TaskStatusQuery;

use crate::ControllerClient;
use crate::error::{ClientError, Result};

impl ControllerClient {
    // =============================================================================
    // Deploys
    // =============================================================================

    /// Deploy one artifact; returns once the task is enqueued
    pub async fn deploy(&self, req: &DeployRequest) -> Result<DeployAccepted> {
        let response = self
            .client
            .post(self.url("/api/deploy"))
            .json(req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Deploy every service in the controller's catalog
    pub async fn deploy_all(&self, operator: Option<String>) -> Result<BatchDeployResult> {
        let response = self
            .client
            .post(self.url("/api/deploy/all"))
            .json(&BatchDeployRequest { operator })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Deploy the named catalog services
    pub async fn deploy_selected(
        &self,
        services: Vec<String>,
        operator: Option<String>,
    ) -> Result<BatchDeployResult> {
        let response = self
            .client
            .post(self.url("/api/deploy/selected"))
            .json(&SelectedDeployRequest { services, operator })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List the controller's service catalog
    pub async fn services(&self) -> Result<Vec<ServiceSummary>> {
        let response = self.client.get(self.url("/api/services")).send().await?;

        self.handle_response(response).await
    }

    /// Enqueue START, STOP or RESTART for a service
    pub async fn service_command(
        &self,
        service: &str,
        action: TaskAction,
        req: &ServiceCommandRequest,
    ) -> Result<TaskAccepted> {
        if action.requires_artifact() {
            return Err(ClientError::InvalidRequest(format!(
                "{} is not a service command",
                action
            )));
        }
        let url = self.url(&format!("/api/services/{}/{}", service, action.verb()));
        let response = self.client.post(&url).json(req).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Task Status
    // =============================================================================

    /// Aggregated status of one task
    pub async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        let url = self.url(&format!("/api/tasks/{}", task_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Status of several tasks; unknown ids are omitted
    pub async fn task_statuses(&self, task_ids: Vec<String>) -> Result<Vec<TaskStatus>> {
        let response = self
            .client
            .post(self.url("/api/tasks/status"))
            .json(&TaskStatusQuery { task_ids })
            .send()
            .await?;

        self.handle_response(response).await
    }
}
