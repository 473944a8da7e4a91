//! Configuration module
//!
//! Handles CLI configuration, currently just where the controller lives.

use convoy_client::ControllerClient;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the controller service
    pub controller_url: String,
}

impl Config {
    pub fn client(&self) -> ControllerClient {
        ControllerClient::new(&self.controller_url)
    }
}
