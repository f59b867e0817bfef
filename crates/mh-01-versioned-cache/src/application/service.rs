//! # Versioned Cache Service
//!
//! Bounded LRU map of loaded modules with TTL expiry and durable
//! persistence.
//!
//! ## Concurrency
//!
//! One mutex guards the LRU map. Dispose hooks always run after the lock is
//! released, so a hook may call back into the cache.
//!
//! ## Failure semantics
//!
//! Persistence I/O failures are logged and swallowed; the in-memory cache
//! stays authoritative. A corrupted or schema-incompatible payload is
//! discarded as a whole.

use crate::config::CacheConfig;
use crate::domain::{
    needs_update, same_major, CacheEntry, CacheError, CacheMeta, CachePayload, CacheStats,
    EntryStats, PersistedEntry,
};
use lru::LruCache;
use parking_lot::Mutex;
use shared_types::{DurableStore, ModuleName, SystemTimeSource, TimeSource};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Versioned module cache.
pub struct VersionedCache {
    config: CacheConfig,
    entries: Mutex<LruCache<ModuleName, CacheEntry>>,
    clock: Arc<dyn TimeSource>,
    store: Option<Arc<dyn DurableStore>>,
    counters: Counters,
}

impl VersionedCache {
    /// Create an in-memory cache reading wall-clock time.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            entries: Mutex::new(LruCache::new(capacity)),
            clock: Arc::new(SystemTimeSource),
            store: None,
            counters: Counters::default(),
        }
    }

    /// Use `clock` for TTL and ages.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Enable `persist`/`restore` against `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a live entry, promoting it to most recently used.
    ///
    /// An expired entry is removed (and disposed) and reported as absent.
    pub fn get(&self, name: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        let mut cache = self.entries.lock();

        let expired = match cache.peek(name) {
            Some(entry) => entry.is_expired(now),
            None => {
                drop(cache);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            let removed = cache.pop(name);
            drop(cache);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            if let Some(entry) = removed {
                self.expire(entry);
            }
            return None;
        }

        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        cache.get(name).cloned()
    }

    /// Store `entry` under `name`, replacing any existing entry.
    ///
    /// Stamps `created_at`, applies the default TTL when `entry.ttl` is
    /// unset, and evicts the least recently used entry when full.
    pub fn set(&self, name: &str, mut entry: CacheEntry) {
        entry.name = name.to_string();
        entry.created_at = self.clock.now();
        if entry.ttl.is_none() {
            entry.ttl = self.config.default_ttl();
        }
        debug!(module = %name, version = %entry.version, "Cache set");
        self.insert(entry);
    }

    /// Returns true if an entry was removed.
    pub fn delete(&self, name: &str) -> bool {
        let removed = self.entries.lock().pop(name);
        match removed {
            Some(entry) => {
                debug!(module = %name, "Cache delete");
                entry.dispose();
                true
            }
            None => false,
        }
    }

    /// Whether a live entry exists. Does not affect recency.
    pub fn has(&self, name: &str) -> bool {
        let now = self.clock.now();
        let mut cache = self.entries.lock();
        match cache.peek(name).map(|entry| entry.is_expired(now)) {
            Some(true) => {
                let removed = cache.pop(name);
                drop(cache);
                if let Some(entry) = removed {
                    self.expire(entry);
                }
                false
            }
            Some(false) => true,
            None => false,
        }
    }

    /// Remove every entry, disposing each.
    pub fn clear(&self) {
        let drained: Vec<CacheEntry> = {
            let mut cache = self.entries.lock();
            std::iter::from_fn(|| cache.pop_lru().map(|(_, entry)| entry)).collect()
        };
        for entry in &drained {
            entry.dispose();
        }
        info!(removed = drained.len(), "Cache cleared");
    }

    /// Stored entries, including expired ones not yet swept.
    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    /// Names of live entries, most recently used first.
    pub fn keys(&self) -> Vec<ModuleName> {
        let now = self.clock.now();
        self.entries
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Whether the cached module must be reloaded to satisfy
    /// `version` / `hash`. Absent or expired entries always need one.
    pub fn needs_update(&self, name: &str, version: &str, hash: Option<&str>) -> bool {
        let now = self.clock.now();
        let cache = self.entries.lock();
        match cache.peek(name) {
            Some(entry) if !entry.is_expired(now) => needs_update(
                &entry.version,
                entry.content_hash.as_deref(),
                version,
                hash,
            ),
            _ => true,
        }
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<CacheEntry> = {
            let mut cache = self.entries.lock();
            let names: Vec<ModuleName> = cache
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(name, _)| name.clone())
                .collect();
            names.iter().filter_map(|name| cache.pop(name)).collect()
        };

        let removed = expired.len();
        for entry in expired {
            self.expire(entry);
        }
        if removed > 0 {
            debug!(removed, "Expired cache entries swept");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries: Vec<EntryStats> = self
            .entries
            .lock()
            .iter()
            .map(|(name, entry)| EntryStats {
                name: name.clone(),
                version: entry.version.clone(),
                age_ms: entry.age_ms(now),
                estimated_bytes: PersistedEntry::from_entry(entry).estimated_bytes(),
                has_handle: entry.module_handle.is_some(),
            })
            .collect();

        let size = entries.len();
        let max_size = self.config.max_size.max(1);
        CacheStats {
            size,
            max_size,
            occupancy: size as f64 / max_size as f64,
            total_estimated_bytes: entries.iter().map(|e| e.estimated_bytes).sum(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            entries,
        }
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    /// Write live entries to durable storage. Failures are logged.
    ///
    /// Returns true if the records were written.
    pub fn persist(&self) -> bool {
        match self.try_persist() {
            Ok(count) => {
                info!(entries = count, namespace = %self.config.namespace, "Cache persisted");
                true
            }
            Err(e) => {
                warn!(error = %e, "Cache persist failed; in-memory cache remains authoritative");
                false
            }
        }
    }

    /// Write live entries to durable storage.
    pub fn try_persist(&self) -> Result<usize, CacheError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let now = self.clock.now();
        let entries: BTreeMap<ModuleName, PersistedEntry> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(name, entry)| (name.clone(), PersistedEntry::from_entry(entry)))
            .collect();

        let size = entries.len();
        let payload = CachePayload {
            timestamp: now,
            entries,
        };
        let meta = CacheMeta {
            schema_version: self.config.schema_version.clone(),
            config: self.config.clone(),
            size,
        };

        store.put(&self.config.entries_key(), &serde_json::to_string(&payload)?)?;
        store.put(&self.config.meta_key(), &serde_json::to_string(&meta)?)?;
        Ok(size)
    }

    /// Reload persisted entries. Failures are logged and leave the cache
    /// cold. Returns the number of restored entries.
    pub fn restore(&self) -> usize {
        match self.try_restore() {
            Ok(count) => {
                info!(entries = count, namespace = %self.config.namespace, "Cache restored");
                count
            }
            Err(e) if e.requires_reset() => {
                warn!(error = %e, "Persisted cache discarded");
                0
            }
            Err(e) => {
                warn!(error = %e, "Cache restore failed; starting cold");
                0
            }
        }
    }

    /// Reload persisted entries.
    ///
    /// Skips expired entries, entries older than their configured baseline
    /// version, and names that already hold a live entry. A corrupted or
    /// schema-incompatible payload is deleted from storage and reported.
    pub fn try_restore(&self) -> Result<usize, CacheError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let payload = match self.read_persisted(store.as_ref()) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(0),
            Err(e) => {
                if e.requires_reset() {
                    self.reset_storage(store.as_ref());
                }
                return Err(e);
            }
        };

        let now = self.clock.now();
        let mut candidates: Vec<PersistedEntry> = payload.entries.into_values().collect();
        candidates.sort_by_key(|entry| entry.created_at);

        let mut restored = 0;
        for persisted in candidates {
            let entry = persisted.into_entry();

            if entry.is_expired(now) {
                debug!(module = %entry.name, "Skipping expired persisted entry");
                continue;
            }
            if let Some(baseline) = self.config.baseline_versions.get(&entry.name) {
                if needs_update(&entry.version, None, baseline, None) {
                    debug!(
                        module = %entry.name,
                        stored = %entry.version,
                        baseline = %baseline,
                        "Skipping persisted entry older than baseline"
                    );
                    continue;
                }
            }
            if self.entries.lock().contains(&entry.name) {
                continue;
            }

            self.insert(entry);
            restored += 1;
        }
        Ok(restored)
    }

    fn read_persisted(&self, store: &dyn DurableStore) -> Result<Option<CachePayload>, CacheError> {
        let meta_raw = store.get(&self.config.meta_key())?;
        let entries_raw = store.get(&self.config.entries_key())?;

        let (meta_raw, entries_raw) = match (meta_raw, entries_raw) {
            (None, None) => return Ok(None),
            (Some(meta), Some(entries)) => (meta, entries),
            _ => {
                return Err(CacheError::Corrupted(
                    "persisted cache is missing a record".to_string(),
                ))
            }
        };

        let meta: CacheMeta = serde_json::from_str(&meta_raw)
            .map_err(|e| CacheError::Corrupted(format!("meta: {e}")))?;
        if !same_major(&meta.schema_version, &self.config.schema_version) {
            return Err(CacheError::SchemaMismatch {
                stored: meta.schema_version,
                running: self.config.schema_version.clone(),
            });
        }

        let payload: CachePayload = serde_json::from_str(&entries_raw)
            .map_err(|e| CacheError::Corrupted(format!("entries: {e}")))?;
        Ok(Some(payload))
    }

    fn reset_storage(&self, store: &dyn DurableStore) {
        for key in [self.config.entries_key(), self.config.meta_key()] {
            if let Err(e) = store.delete(&key) {
                warn!(key = %key, error = %e, "Failed to delete persisted cache record");
            }
        }
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn insert(&self, entry: CacheEntry) {
        let name = entry.name.clone();
        let new_handle = entry.module_handle.clone();
        let displaced = self.entries.lock().push(name.clone(), entry);

        let Some((displaced_name, old)) = displaced else {
            return;
        };
        if displaced_name != name {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(module = %displaced_name, "Evicted least recently used entry");
        }
        let same_handle = match (&old.module_handle, &new_handle) {
            (Some(a), Some(b)) => displaced_name == name && a.ptr_eq(b),
            _ => false,
        };
        if !same_handle {
            old.dispose();
        }
    }

    fn expire(&self, entry: CacheEntry) {
        self.counters.expirations.fetch_add(1, Ordering::Relaxed);
        debug!(module = %entry.name, "Cache entry expired");
        entry.dispose();
    }
}

impl std::fmt::Debug for VersionedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedCache")
            .field("config", &self.config)
            .field("size", &self.size())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}
