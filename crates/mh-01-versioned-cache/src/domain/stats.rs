//! # Cache Statistics

use serde::Serialize;
use shared_types::ModuleName;

/// Snapshot returned by `VersionedCache::stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    /// `size / max_size`.
    pub occupancy: f64,
    /// Sum of `entries[*].estimated_bytes`.
    pub total_estimated_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Most recently used first.
    pub entries: Vec<EntryStats>,
}

/// Per-entry part of [`CacheStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryStats {
    pub name: ModuleName,
    pub version: String,
    pub age_ms: u64,
    /// Best-effort serialized length.
    pub estimated_bytes: usize,
    pub has_handle: bool,
}
