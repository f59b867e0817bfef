//! # Shared State Service
//!
//! Ownership-tagged key/value table shared by every module. Every
//! successful write or delete is announced on the event bus
//! (`shared-state:change` / `shared-state:remove`) so subscribers never
//! need to poll.
//!
//! ## Consistency
//!
//! Last write wins per key regardless of owner, and a write transfers
//! ownership to the writer. Concurrent writers from different modules race;
//! there is no conflict resolution beyond write order.
//!
//! Each mutation queues its event on the bus while still holding the map
//! lock, so subscribers observe changes in the order they were applied.
//! Handlers run only after the lock is released, so a handler may read or
//! write the store from any thread.

use crate::config::SharedStateConfig;
use crate::domain::{can_delete, SharedStateEntry, StateError};
use parking_lot::RwLock;
use serde_json::Value;
use shared_bus::{event_types, EventBus, EventPayload, SharedStatePayload};
use shared_types::{duration_millis, DurableStore, SystemTimeSource, TimeSource, SYSTEM_OWNER};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared key/value store.
pub struct SharedStateStore {
    config: SharedStateConfig,
    entries: RwLock<HashMap<String, SharedStateEntry>>,
    bus: EventBus,
    clock: Arc<dyn TimeSource>,
    store: Option<Arc<dyn DurableStore>>,
}

impl SharedStateStore {
    #[must_use]
    pub fn new(bus: EventBus, config: SharedStateConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            bus,
            clock: Arc::new(SystemTimeSource),
            store: None,
        }
    }

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

    pub fn config(&self) -> &SharedStateConfig {
        &self.config
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).map(|entry| entry.value.clone())
    }

    /// Value plus owner, timestamp and persistence flag.
    pub fn get_entry(&self, key: &str) -> Option<SharedStateEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Write `key`. Always succeeds; the writer becomes the owner.
    pub fn set(&self, key: &str, value: impl Into<Value>, owner: &str, persistent: bool) {
        let value = value.into();
        let entry = SharedStateEntry {
            key: key.to_string(),
            value: value.clone(),
            owner: owner.to_string(),
            timestamp: self.clock.now(),
            persistent,
        };

        {
            let mut entries = self.entries.write();
            let previous = entries.insert(key.to_string(), entry);
            if let Some(prev) = &previous {
                if prev.owner != owner {
                    debug!(key = %key, from = %prev.owner, to = %owner, "Shared state ownership transferred");
                }
            }

            self.bus.post(
                event_types::SHARED_STATE_CHANGE,
                EventPayload::SharedState(SharedStatePayload::Change {
                    key: key.to_string(),
                    value,
                    owner: owner.to_string(),
                    previous: previous.map(|prev| prev.value),
                }),
                owner,
            );
        }
        self.bus.flush();
    }

    /// Delete `key` on behalf of `owner`.
    ///
    /// Returns `false` (entry unchanged) when the key is absent or `owner`
    /// is neither the stored owner nor the system identity.
    pub fn delete(&self, key: &str, owner: &str) -> bool {
        {
            let mut entries = self.entries.write();
            let Some(entry) = entries.get(key) else {
                return false;
            };
            if !can_delete(entry, owner) {
                warn!(
                    key = %key,
                    owner = %entry.owner,
                    requester = %owner,
                    "Shared state delete rejected: not the owner"
                );
                return false;
            }
            entries.remove(key);
            self.post_removal(key, owner);
        }
        self.bus.flush();
        true
    }

    /// Keys, sorted.
    pub fn list_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove the non-persistent entries owned by `owner`, as the system
    /// identity. Persistent entries outlive their writer.
    ///
    /// Used when a module is unloaded. Returns the number removed.
    pub fn clear_owner(&self, owner: &str) -> usize {
        let removed = self.remove_where(|entry| entry.owner == owner && !entry.persistent);
        if removed > 0 {
            info!(owner = %owner, removed, "Cleared shared state of owner");
        }
        removed
    }

    /// Remove non-persistent entries older than `max_age`.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let max_age_ms = duration_millis(self.config.max_age());

        let removed = self.remove_where(|entry| entry.is_stale(now, max_age_ms));
        if removed > 0 {
            info!(removed, "Swept stale shared state");
        }
        removed
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    /// Write persistent entries to durable storage. Failures are logged.
    pub fn persist(&self) -> bool {
        match self.try_persist() {
            Ok(count) => {
                debug!(entries = count, "Shared state persisted");
                true
            }
            Err(e) => {
                warn!(error = %e, "Shared state persist failed");
                false
            }
        }
    }

    /// Write the `persistent` subset to `<namespace>:persistent`.
    pub fn try_persist(&self) -> Result<usize, StateError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let persistent: BTreeMap<String, SharedStateEntry> = self
            .entries
            .read()
            .values()
            .filter(|entry| entry.persistent)
            .map(|entry| (entry.key.clone(), entry.clone()))
            .collect();

        store.put(
            &self.config.persistent_key(),
            &serde_json::to_string(&persistent)?,
        )?;
        Ok(persistent.len())
    }

    /// Reload persisted entries. Keys already present are kept. Failures
    /// are logged; a corrupted payload is deleted.
    pub fn restore(&self) -> usize {
        match self.try_restore() {
            Ok(count) => {
                info!(entries = count, "Shared state restored");
                count
            }
            Err(e) => {
                warn!(error = %e, "Shared state restore failed; starting empty");
                0
            }
        }
    }

    pub fn try_restore(&self) -> Result<usize, StateError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let key = self.config.persistent_key();
        let Some(raw) = store.get(&key)? else {
            return Ok(0);
        };

        let persisted: BTreeMap<String, SharedStateEntry> = match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                if let Err(delete_err) = store.delete(&key) {
                    warn!(key = %key, error = %delete_err, "Failed to delete corrupted shared state");
                }
                return Err(StateError::Corrupted(e.to_string()));
            }
        };

        let mut entries = self.entries.write();
        let mut restored = 0;
        for (key, mut entry) in persisted {
            if entries.contains_key(&key) {
                continue;
            }
            entry.key = key.clone();
            entry.persistent = true;
            entries.insert(key, entry);
            restored += 1;
        }
        Ok(restored)
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// Remove matching entries as the system identity. Returns the count.
    fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&SharedStateEntry) -> bool,
    {
        let removed = {
            let mut entries = self.entries.write();
            let mut keys: Vec<String> = entries
                .values()
                .filter(|entry| predicate(entry))
                .map(|entry| entry.key.clone())
                .collect();
            keys.sort();
            for key in &keys {
                entries.remove(key);
                self.post_removal(key, SYSTEM_OWNER);
            }
            keys.len()
        };
        self.bus.flush();
        removed
    }

    /// Queue a `shared-state:remove`. Called with the map lock held.
    fn post_removal(&self, key: &str, by: &str) {
        self.bus.post(
            event_types::SHARED_STATE_REMOVE,
            EventPayload::SharedState(SharedStatePayload::Remove {
                key: key.to_string(),
                owner: by.to_string(),
            }),
            by,
        );
    }
}

impl std::fmt::Debug for SharedStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStateStore")
            .field("config", &self.config)
            .field("entries", &self.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}
