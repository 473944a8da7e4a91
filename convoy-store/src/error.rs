//! Error types for the coordination store

use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not obtain a connection
    #[error("store connection failed: {0}")]
    Connection(String),

    /// The store rejected or failed a command
    #[error("store command failed: {0}")]
    Command(String),

    /// A stored record could not be encoded or decoded
    #[error("malformed record at '{key}': {message}")]
    Serialization { key: String, message: String },
}

impl StoreError {
    pub fn serialization(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Serialization {
            key: key.into(),
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_io_error() || err.is_connection_dropped() {
            Self::Connection(err.to_string())
        } else {
            Self::Command(err.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<StoreError> for convoy_core::Error {
    fn from(err: StoreError) -> Self {
        convoy_core::Error::transport(err.to_string())
    }
}
