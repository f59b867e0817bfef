//! # Cache Entry
//!
//! A loaded module record. The handle's lifetime is bound to the entry:
//! when the cache drops an entry (eviction, delete, expiry, clear or
//! overwrite) it runs the entry's dispose hook exactly once.

use serde_json::Value;
use shared_types::{duration_millis, ModuleHandle, ModuleName, Timestamp};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Called with the entry being dropped by the cache.
pub type DisposeHook = Arc<dyn Fn(&CacheEntry) + Send + Sync>;

/// A cached module.
#[derive(Clone)]
pub struct CacheEntry {
    pub name: ModuleName,
    /// Semantic version string.
    pub version: String,
    /// Live handle. `None` for entries restored from durable storage.
    pub module_handle: Option<ModuleHandle>,
    /// Insertion time (milliseconds).
    pub created_at: Timestamp,
    /// Time-to-live. `None` when set means the cache default applies.
    pub ttl: Option<Duration>,
    pub content_hash: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    dispose: Option<DisposeHook>,
}

impl CacheEntry {
    pub fn new(name: impl Into<String>, version: impl Into<String>, handle: ModuleHandle) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            module_handle: Some(handle),
            created_at: 0,
            ttl: None,
            content_hash: None,
            metadata: BTreeMap::new(),
            dispose: None,
        }
    }

    /// An entry without a live handle.
    pub fn detached(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            module_handle: None,
            ..Self::new(name, version, ModuleHandle::new(()))
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Register the hook run when the cache drops this entry.
    #[must_use]
    pub fn on_dispose<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        self.dispose = Some(Arc::new(hook));
        self
    }

    /// Milliseconds since insertion.
    pub fn age_ms(&self, now: Timestamp) -> u64 {
        now.saturating_sub(self.created_at)
    }

    /// Expired once the full TTL has elapsed.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.ttl
            .is_some_and(|ttl| self.age_ms(now) >= duration_millis(ttl))
    }

    /// Run the dispose hook. Only the cache calls this.
    pub(crate) fn dispose(&self) {
        if let Some(hook) = &self.dispose {
            hook(self);
        }
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("has_handle", &self.module_handle.is_some())
            .field("created_at", &self.created_at)
            .field("ttl", &self.ttl)
            .field("content_hash", &self.content_hash)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
