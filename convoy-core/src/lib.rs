//! Convoy Core
//!
//! Core types and abstractions shared by the Convoy controller and agents.
//!
//! This crate contains:
//! - Domain types: tasks, task status, service versions, node snapshots
//! - DTOs: request/response bodies for the controller API
//! - Error taxonomy used across crate boundaries
//! - Coordination store key conventions and TTLs

pub mod checksum;
pub mod domain;
pub mod dto;
pub mod error;
pub mod keys;

pub use error::{Error, ErrorCode, Result};
