//! Data Transfer Objects for the controller API
//!
//! Request and response bodies exchanged between the CLI, the client crate
//! and the controller's HTTP surface.

pub mod artifact;
pub mod deploy;
pub mod monitor;
pub mod rollback;
