//! # Mock Module Registry
//!
//! Scriptable registry for tests: per-module versions and hashes, injected
//! failures, an optional load delay, and call counters.

use crate::domain::RegistryError;
use crate::ports::{LoadedModule, ModuleRegistry, RegisteredModule};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{ModuleHandle, ModuleName};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Value wrapped in handles produced by [`MockModuleRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockModule {
    pub name: ModuleName,
    pub version: String,
    /// 1 for the first successful load of `name`, 2 for the next, ...
    pub instance: u32,
}

#[derive(Default)]
struct MockState {
    versions: HashMap<String, String>,
    hashes: HashMap<String, String>,
    locators: BTreeMap<String, String>,
    fail_next: HashMap<String, u32>,
    fail_always: HashMap<String, bool>,
    load_calls: HashMap<String, u32>,
    unload_calls: HashMap<String, u32>,
    instances: HashMap<String, u32>,
    loaded: HashMap<String, bool>,
}

/// Mock registry. Unknown modules load at version `1.0.0`.
#[derive(Default)]
pub struct MockModuleRegistry {
    state: Mutex<MockState>,
    delay: Mutex<Duration>,
    unload_fails: AtomicBool,
}

impl MockModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every load take `delay` (tokio time).
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = delay;
        self
    }

    pub fn set_version(&self, name: &str, version: &str) {
        self.state
            .lock()
            .versions
            .insert(name.to_string(), version.to_string());
    }

    pub fn set_hash(&self, name: &str, hash: &str) {
        self.state
            .lock()
            .hashes
            .insert(name.to_string(), hash.to_string());
    }

    /// Fail the next `count` loads of `name`.
    pub fn fail_next(&self, name: &str, count: u32) {
        self.state.lock().fail_next.insert(name.to_string(), count);
    }

    /// Fail every load of `name` until reset.
    pub fn fail_always(&self, name: &str, fail: bool) {
        self.state.lock().fail_always.insert(name.to_string(), fail);
    }

    pub fn set_unload_fails(&self, fail: bool) {
        self.unload_fails.store(fail, Ordering::SeqCst);
    }

    pub fn load_count(&self, name: &str) -> u32 {
        self.state.lock().load_calls.get(name).copied().unwrap_or(0)
    }

    pub fn unload_count(&self, name: &str) -> u32 {
        self.state.lock().unload_calls.get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ModuleRegistry for MockModuleRegistry {
    async fn register(&self, name: &str, locator: &str) -> Result<(), RegistryError> {
        self.state
            .lock()
            .locators
            .insert(name.to_string(), locator.to_string());
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<LoadedModule, RegistryError> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        *state.load_calls.entry(name.to_string()).or_default() += 1;

        let always = state.fail_always.get(name).copied().unwrap_or(false);
        let scripted = match state.fail_next.get_mut(name) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if always || scripted {
            return Err(RegistryError::LoadFailed {
                name: name.to_string(),
                reason: "mock failure".to_string(),
            });
        }

        let version = state
            .versions
            .get(name)
            .cloned()
            .unwrap_or_else(|| "1.0.0".to_string());
        let instance = {
            let counter = state.instances.entry(name.to_string()).or_default();
            *counter += 1;
            *counter
        };
        state.loaded.insert(name.to_string(), true);

        let handle = ModuleHandle::new(MockModule {
            name: name.to_string(),
            version: version.clone(),
            instance,
        });
        let loaded = LoadedModule::new(handle, version);
        Ok(match state.hashes.get(name) {
            Some(hash) => loaded.with_hash(hash.clone()),
            None => loaded,
        })
    }

    async fn unload(&self, name: &str) -> Result<(), RegistryError> {
        let mut state = self.state.lock();
        *state.unload_calls.entry(name.to_string()).or_default() += 1;
        state.loaded.insert(name.to_string(), false);

        if self.unload_fails.load(Ordering::SeqCst) {
            return Err(RegistryError::UnloadFailed {
                name: name.to_string(),
                reason: "mock unload failure".to_string(),
            });
        }
        Ok(())
    }

    async fn get_module(&self, name: &str) -> Option<RegisteredModule> {
        let state = self.state.lock();
        state.locators.get(name).map(|locator| RegisteredModule {
            name: name.to_string(),
            locator: locator.clone(),
            version: state.versions.get(name).cloned(),
            loaded: state.loaded.get(name).copied().unwrap_or(false),
        })
    }

    async fn list_modules(&self) -> Vec<RegisteredModule> {
        let state = self.state.lock();
        state
            .locators
            .iter()
            .map(|(name, locator)| RegisteredModule {
                name: name.clone(),
                locator: locator.clone(),
                version: state.versions.get(name).cloned(),
                loaded: state.loaded.get(name).copied().unwrap_or(false),
            })
            .collect()
    }

    async fn is_loaded(&self, name: &str) -> bool {
        self.state.lock().loaded.get(name).copied().unwrap_or(false)
    }
}
