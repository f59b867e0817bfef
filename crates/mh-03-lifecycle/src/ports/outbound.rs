//! # Outbound Ports
//!
//! The registry performs the actual fetch and instantiation of a module.
//! Transport, timeouts and source verification are its concern; the
//! coordinator only sequences calls and reacts to results.

use crate::domain::RegistryError;
use async_trait::async_trait;
use serde::Serialize;
use shared_types::{ModuleHandle, ModuleName};

/// Result of a successful registry load.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub handle: ModuleHandle,
    /// Version actually loaded.
    pub version: String,
    /// Content hash of the loaded bundle, when the registry knows it.
    pub content_hash: Option<String>,
}

impl LoadedModule {
    pub fn new(handle: ModuleHandle, version: impl Into<String>) -> Self {
        Self {
            handle,
            version: version.into(),
            content_hash: None,
        }
    }

    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }
}

/// What the registry knows about one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredModule {
    pub name: ModuleName,
    pub locator: String,
    pub version: Option<String>,
    pub loaded: bool,
}

/// Module registry - outbound port.
#[async_trait]
pub trait ModuleRegistry: Send + Sync {
    /// Record where `name` is loaded from.
    async fn register(&self, name: &str, locator: &str) -> Result<(), RegistryError>;

    /// Fetch and instantiate `name`.
    async fn load(&self, name: &str) -> Result<LoadedModule, RegistryError>;

    /// Release registry-side resources of `name`.
    async fn unload(&self, name: &str) -> Result<(), RegistryError>;

    async fn get_module(&self, name: &str) -> Option<RegisteredModule>;

    async fn list_modules(&self) -> Vec<RegisteredModule>;

    async fn is_loaded(&self, name: &str) -> bool;
}
