//! Error taxonomy
//!
//! Every failure that crosses a crate boundary is one of these kinds. The
//! stable [`ErrorCode`] is what ends up in `TaskStatus::error_code`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Convoy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Convoy error kinds
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Malformed request or task
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing artifact, version, backup, node or task
    #[error("not found: {0}")]
    NotFound(String),

    /// Coordination store or network transfer failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Start/stop/kill failure or startup timeout
    #[error("process error: {0}")]
    Process(String),

    /// Illegal state transition
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Stable machine-readable error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    TransportError,
    ProcessError,
    Conflict,
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Stable code for this error kind
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Transport(_) => ErrorCode::TransportError,
            Self::Process(_) => ErrorCode::ProcessError,
            Self::Conflict(_) => ErrorCode::Conflict,
        }
    }

    /// The message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m)
            | Self::NotFound(m)
            | Self::Transport(m)
            | Self::Process(m)
            | Self::Conflict(m) => m,
        }
    }

    /// Prepends context to the message, keeping the kind
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            Self::Validation(m) => Self::Validation(format!("{}: {}", ctx, m)),
            Self::NotFound(m) => Self::NotFound(format!("{}: {}", ctx, m)),
            Self::Transport(m) => Self::Transport(format!("{}: {}", ctx, m)),
            Self::Process(m) => Self::Process(format!("{}: {}", ctx, m)),
            Self::Conflict(m) => Self::Conflict(format!("{}: {}", ctx, m)),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::ProcessError => "PROCESS_ERROR",
            Self::Conflict => "CONFLICT",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::validation("x").code(), ErrorCode::ValidationError);
        assert_eq!(Error::not_found("x").code(), ErrorCode::NotFound);
        assert_eq!(Error::transport("x").code(), ErrorCode::TransportError);
        assert_eq!(Error::process("x").code(), ErrorCode::ProcessError);
        assert_eq!(Error::conflict("x").code(), ErrorCode::Conflict);
    }

    #[test]
    fn test_context_keeps_kind() {
        let err = Error::process("startup timeout").context("node n1");
        assert_eq!(err.code(), ErrorCode::ProcessError);
        assert_eq!(err.message(), "node n1: startup timeout");
    }

    #[test]
    fn test_error_code_wire_format() {
        let json = serde_json::to_string(&ErrorCode::ValidationError).unwrap();
        assert_eq!(json, "\"VALIDATION_ERROR\"");
        assert_eq!(ErrorCode::ProcessError.to_string(), "PROCESS_ERROR");
    }
}
