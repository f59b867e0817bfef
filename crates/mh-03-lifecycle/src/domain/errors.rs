//! # Domain Errors

use thiserror::Error;

/// Errors reported by a [`ModuleRegistry`](crate::ports::ModuleRegistry).
///
/// Load failures are retryable; the coordinator surfaces them as
/// `module:error` events, never as returned errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The module was never registered.
    #[error("Module not registered: {0}")]
    NotRegistered(String),

    /// The registry could not produce a handle.
    #[error("Failed to load {name}: {reason}")]
    LoadFailed { name: String, reason: String },

    /// The registry gave up waiting for the module source.
    #[error("Timed out loading {0}")]
    Timeout(String),

    /// Releasing registry-side resources failed.
    #[error("Failed to unload {name}: {reason}")]
    UnloadFailed { name: String, reason: String },

    #[error("Invalid module source for {name}: {reason}")]
    InvalidSource { name: String, reason: String },
}

/// Errors returned by coordinator operations other than loads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Invalid module name: {0:?}")]
    InvalidName(String),
}
