//! # Persisted Records
//!
//! Two records live under the cache namespace:
//!
//! ```text
//! <namespace>:entries  {"timestamp": ms, "entries": {name: PersistedEntry}}
//! <namespace>:meta     {"schema_version": "1.0.0", "config": {...}, "size": n}
//! ```
//!
//! Handles are never persisted; restored entries come back detached.

use super::entry::CacheEntry;
use crate::config::CacheConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{ModuleName, Timestamp};
use std::collections::BTreeMap;
use std::time::Duration;

/// Entry minus its handle and dispose hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub name: ModuleName,
    pub version: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl PersistedEntry {
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            name: entry.name.clone(),
            version: entry.version.clone(),
            created_at: entry.created_at,
            ttl_ms: entry.ttl.map(shared_types::duration_millis),
            content_hash: entry.content_hash.clone(),
            metadata: entry.metadata.clone(),
        }
    }

    pub fn into_entry(self) -> CacheEntry {
        let mut entry = CacheEntry::detached(self.name, self.version);
        entry.created_at = self.created_at;
        entry.ttl = self.ttl_ms.map(Duration::from_millis);
        entry.content_hash = self.content_hash;
        entry.metadata = self.metadata;
        entry
    }

    /// Best-effort serialized size in bytes.
    pub fn estimated_bytes(&self) -> usize {
        serde_json::to_vec(self).map_or(0, |bytes| bytes.len())
    }
}

/// The `<namespace>:entries` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePayload {
    pub timestamp: Timestamp,
    pub entries: BTreeMap<ModuleName, PersistedEntry>,
}

/// The `<namespace>:meta` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub schema_version: String,
    pub config: CacheConfig,
    pub size: usize,
}
