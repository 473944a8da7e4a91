//! Artifact endpoints

use convoy_core::dto::artifact::{ArtifactInfo, BuildRequest};

use crate::ControllerClient;
use crate::error::{ClientError, Result};

impl ControllerClient {
    // =============================================================================
    // Artifacts
    // =============================================================================

    /// Resolve a project reference to a deployable artifact
    pub async fn build(&self, project_ref: &str) -> Result<ArtifactInfo> {
        let req = BuildRequest {
            project_ref: project_ref.to_string(),
        };
        let response = self
            .client
            .post(self.url("/api/build"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Upload artifact bytes under `file_name`
    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<ArtifactInfo> {
        if file_name.is_empty() || file_name.contains('/') {
            return Err(ClientError::InvalidRequest(format!(
                "invalid artifact file name: {:?}",
                file_name
            )));
        }
        let url = self.url(&format!("/api/artifacts/{}", file_name));
        let response = self.client.put(&url).body(bytes).send().await?;

        self.handle_response(response).await
    }
}
