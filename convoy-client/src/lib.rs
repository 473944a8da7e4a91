//! Convoy HTTP Client
//!
//! A type-safe HTTP client for the Convoy controller API, used by the CLI.
//!
//! # Example
//!
//! ```no_run
//! use convoy_client::ControllerClient;
//! use convoy_core::dto::deploy::DeployRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ControllerClient::new("http://localhost:8080");
//!
//!     let accepted = client.deploy(&DeployRequest {
//!         service_name: "api".to_string(),
//!         artifact_path: "/srv/builds/api.jar".to_string(),
//!         target_nodes: vec!["node-1".to_string()],
//!         force_deploy: false,
//!         operator: None,
//!         description: None,
//!     }).await?;
//!
//!     println!("Deploy task: {}", accepted.task_id);
//!     Ok(())
//! }
//! ```

mod artifacts;
mod deploy;
pub mod error;
mod monitor;
mod rollback;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Convoy controller API
///
/// Methods are grouped by concern:
/// - Artifacts (build resolution, upload)
/// - Deploys, service commands and task status
/// - Rollback and version history
/// - Node and health monitoring
#[derive(Debug, Clone)]
pub struct ControllerClient {
    /// Base URL of the controller (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ControllerClient {
    /// Create a new controller client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new controller client with a custom HTTP client
    ///
    /// Rollback calls block until the agents finish, so callers that expect
    /// long rollbacks should not set a short request timeout here.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the controller
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            return Err(Self::error_from(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response whose body is not needed
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(())
    }

    /// Uses the `{"error": ...}` message when the body carries one
    async fn error_from(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or(text);
        tracing::debug!("Controller returned {}: {}", status, message);
        ClientError::api_error(status, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_client_creation() {
        let client = ControllerClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ControllerClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/api/nodes"), "http://localhost:8080/api/nodes");
    }

    /// Serves one canned HTTP response and returns its base URL
    async fn canned(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_api_error_message_is_extracted() {
        let base = canned("404 Not Found", r#"{"error":"task not found: t1"}"#).await;
        let client = ControllerClient::new(base);

        let err = client.task_status("t1").await.unwrap_err();
        assert!(err.is_not_found());
        match err {
            ClientError::ApiError { message, .. } => assert_eq!(message, "task not found: t1"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_services_lists_catalog() {
        let base = canned(
            "200 OK",
            r#"[{"name":"svc-a","artifact_path":"/srv/svc-a.jar","target_nodes":["n1","n2"],"description":"api"}]"#,
        )
        .await;
        let client = ControllerClient::new(base);

        let services = client.services().await.unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "svc-a");
        assert_eq!(services[0].target_nodes, vec!["n1", "n2"]);
        assert_eq!(services[0].description.as_deref(), Some("api"));
    }

    #[tokio::test]
    async fn test_health_check_ok() {
        let base = canned("200 OK", "OK").await;
        let client = ControllerClient::new(base);
        client.health_check().await.unwrap();
    }
}
