//! Core domain types
//!
//! Structures written to and read from the coordination store by both the
//! controller and the agents.

pub mod artifact;
pub mod node;
pub mod service;
pub mod task;
