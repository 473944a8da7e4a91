//! Service layer
//!
//! Business logic of the agent: process lifecycle, health checks, artifact
//! receipt, task execution and host metrics. The executor is trait-based so
//! the poller can be tested without real processes.

mod execution;
mod health;
mod lifecycle;
mod receive;
mod system;

// Re-export traits
pub use execution::TaskExecutor;

// Re-export implementations
pub use execution::{DeployLedger, StandardTaskExecutor};
pub use health::HealthChecker;
pub use lifecycle::ProcessManager;
pub use receive::ArtifactReceiver;
pub use system::SystemSampler;
