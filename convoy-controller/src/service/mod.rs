//! Service Module
//!
//! Business logic layer for the controller. Services sit between the HTTP
//! handlers and the coordination store.

pub mod build;
pub mod deploy;
pub mod distribution;
pub mod monitor;
pub mod rollback;
pub mod versions;

// Re-export for convenience
pub use build::{BuildProvider, LocalArtifactProvider};
pub use deploy::DeployService;
pub use distribution::DistributionEngine;
pub use monitor::MonitorService;
pub use rollback::RollbackService;
pub use versions::VersionStore;
