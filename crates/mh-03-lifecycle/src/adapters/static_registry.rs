//! # Static Module Registry
//!
//! Registry over modules compiled into the host. Each module is provided as
//! a factory; `load` runs the factory and `unload` drops the registry's
//! reference to the instance.

use crate::domain::RegistryError;
use crate::ports::{LoadedModule, ModuleRegistry, RegisteredModule};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::ModuleHandle;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds a fresh instance of a module.
pub type ModuleFactory = Arc<dyn Fn() -> Result<ModuleHandle, String> + Send + Sync>;

struct StaticModule {
    locator: String,
    version: String,
    content_hash: Option<String>,
    factory: Option<ModuleFactory>,
    instance: Option<ModuleHandle>,
}

/// In-process registry of factory-built modules.
#[derive(Default)]
pub struct StaticModuleRegistry {
    modules: RwLock<BTreeMap<String, StaticModule>>,
}

impl StaticModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide (or replace) the factory for `name` at `version`.
    ///
    /// Replacing a factory does not touch a loaded instance; the next load
    /// picks up the new version.
    pub fn provide<F>(&self, name: &str, version: &str, factory: F)
    where
        F: Fn() -> Result<ModuleHandle, String> + Send + Sync + 'static,
    {
        let mut modules = self.modules.write();
        let module = modules.entry(name.to_string()).or_insert_with(|| StaticModule {
            locator: format!("static:{name}"),
            version: version.to_string(),
            content_hash: None,
            factory: None,
            instance: None,
        });
        module.version = version.to_string();
        module.factory = Some(Arc::new(factory));
        debug!(module = %name, version = %version, "Static module provided");
    }

    /// Set the content hash reported for `name`.
    pub fn set_content_hash(&self, name: &str, hash: &str) {
        if let Some(module) = self.modules.write().get_mut(name) {
            module.content_hash = Some(hash.to_string());
        }
    }
}

#[async_trait]
impl ModuleRegistry for StaticModuleRegistry {
    async fn register(&self, name: &str, locator: &str) -> Result<(), RegistryError> {
        if locator.trim().is_empty() {
            return Err(RegistryError::InvalidSource {
                name: name.to_string(),
                reason: "empty locator".to_string(),
            });
        }
        let mut modules = self.modules.write();
        let module = modules.entry(name.to_string()).or_insert_with(|| StaticModule {
            locator: locator.to_string(),
            version: "0.0.0".to_string(),
            content_hash: None,
            factory: None,
            instance: None,
        });
        module.locator = locator.to_string();
        info!(module = %name, locator = %locator, "Module registered");
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<LoadedModule, RegistryError> {
        let (factory, version, content_hash) = {
            let modules = self.modules.read();
            let module = modules
                .get(name)
                .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))?;
            let factory = module.factory.clone().ok_or_else(|| RegistryError::LoadFailed {
                name: name.to_string(),
                reason: "no factory provided".to_string(),
            })?;
            (factory, module.version.clone(), module.content_hash.clone())
        };

        let handle = factory().map_err(|reason| RegistryError::LoadFailed {
            name: name.to_string(),
            reason,
        })?;

        if let Some(module) = self.modules.write().get_mut(name) {
            module.instance = Some(handle.clone());
        }

        let loaded = LoadedModule::new(handle, version);
        Ok(match content_hash {
            Some(hash) => loaded.with_hash(hash),
            None => loaded,
        })
    }

    async fn unload(&self, name: &str) -> Result<(), RegistryError> {
        let mut modules = self.modules.write();
        let module = modules
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))?;
        module.instance = None;
        Ok(())
    }

    async fn get_module(&self, name: &str) -> Option<RegisteredModule> {
        self.modules.read().get(name).map(|module| RegisteredModule {
            name: name.to_string(),
            locator: module.locator.clone(),
            version: Some(module.version.clone()),
            loaded: module.instance.is_some(),
        })
    }

    async fn list_modules(&self) -> Vec<RegisteredModule> {
        self.modules
            .read()
            .iter()
            .map(|(name, module)| RegisteredModule {
                name: name.clone(),
                locator: module.locator.clone(),
                version: Some(module.version.clone()),
                loaded: module.instance.is_some(),
            })
            .collect()
    }

    async fn is_loaded(&self, name: &str) -> bool {
        self.modules
            .read()
            .get(name)
            .is_some_and(|module| module.instance.is_some())
    }
}
