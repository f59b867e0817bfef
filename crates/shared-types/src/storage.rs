//! # Durable Storage Port
//!
//! The cache and shared-state store persist small JSON records under
//! namespaced keys. Anything that can hold string values by key implements
//! [`DurableStore`].
//!
//! Production: `FileDurableStore` (single JSON file, rewritten atomically)
//! Testing: `InMemoryDurableStore`

use crate::errors::StoreError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Abstract interface for durable key-value storage.
pub trait DurableStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite a value.
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// All keys starting with `prefix`, sorted.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// In-memory durable store for unit tests.
///
/// `set_fail_writes(true)` makes every `put`/`delete` fail, which lets tests
/// exercise the log-and-swallow persistence paths.
#[derive(Debug, Default)]
pub struct InMemoryDurableStore {
    data: RwLock<BTreeMap<String, String>>,
    fail_writes: AtomicBool,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backend that rejects writes.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl DurableStore for InMemoryDurableStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.data.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.data.write().remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .data
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// File-backed durable store.
///
/// Keeps the whole map in memory and rewrites `path` on every mutation via a
/// temporary file and rename, so a crash never leaves a half-written file.
pub struct FileDurableStore {
    data: RwLock<BTreeMap<String, String>>,
    path: PathBuf,
}

impl FileDurableStore {
    /// Open (or create on first write) the store at `path`.
    ///
    /// An unreadable or corrupted file is logged and treated as empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();

        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(map) => {
                    info!(path = %path.display(), keys = map.len(), "Loaded durable store");
                    map
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Durable store corrupted, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No durable store file yet");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Durable store unreadable, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            data: RwLock::new(data),
            path,
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, data: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let encoded = serde_json::to_vec_pretty(data)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, encoded)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl DurableStore for FileDurableStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut data = self.data.write();
        let previous = data.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&data) {
            // Keep memory consistent with disk.
            match previous {
                Some(old) => data.insert(key.to_string(), old),
                None => data.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.write();
        let Some(previous) = data.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.flush(&data) {
            data.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .data
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
