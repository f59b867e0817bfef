//! # Domain Errors

use shared_types::StoreError;
use thiserror::Error;

/// Versioned cache errors. None of these reach load callers: persistence
/// failures degrade to cold-cache behaviour.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Durable storage rejected a read or write.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Persisted payload could not be decoded.
    #[error("Persisted cache corrupted: {0}")]
    Corrupted(String),

    /// Persisted payload was written by an incompatible build.
    #[error("Schema mismatch: stored {stored}, running {running}")]
    SchemaMismatch { stored: String, running: String },

    /// Encoding the payload failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    /// Whether the persisted set must be discarded.
    pub fn requires_reset(&self) -> bool {
        matches!(self, Self::Corrupted(_) | Self::SchemaMismatch { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
