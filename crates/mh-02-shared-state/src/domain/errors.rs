//! # Domain Errors

use shared_types::StoreError;
use thiserror::Error;

/// Shared state persistence errors. Ownership violations are not errors:
/// `delete` simply returns `false`.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Persisted payload could not be decoded.
    #[error("Persisted shared state corrupted: {0}")]
    Corrupted(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
