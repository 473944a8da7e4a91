//! Scheduler layer for the agent
//!
//! Two independent loops that communicate only through the coordination
//! store: the poller pops tasks from this node's queue and runs them, the
//! reporter pushes node and health snapshots.

pub mod poller;
pub mod reporter;

pub use poller::TaskPoller;
pub use reporter::SnapshotReporter;
