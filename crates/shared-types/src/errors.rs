//! # Error Types
//!
//! Defines error types used across the module-host crates.

use thiserror::Error;

/// Errors raised by a durable storage backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Reading or writing the backing medium failed.
    #[error("Storage I/O error: {0}")]
    Io(String),

    /// A stored record could not be encoded or decoded.
    #[error("Storage serialization error: {0}")]
    Serialization(String),

    /// The backend refused the operation (quota, read-only, simulated failure).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
