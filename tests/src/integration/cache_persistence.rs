//! # Cache Persistence
//!
//! Versioned cache records surviving a restart through the file-backed
//! durable store, and what a restart refuses to bring back.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use mh_01_versioned_cache::{CacheConfig, CacheEntry, VersionedCache};
    use mh_03_lifecycle::{LifecycleConfig, LifecycleCoordinator, LoadOutcome, MockModuleRegistry};
    use shared_bus::{BusConfig, EventBus};
    use shared_types::{DurableStore, FileDurableStore, ManualTimeSource, ModuleHandle};
    use tempfile::TempDir;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const START: u64 = 1_700_000_000_000;

    struct Disk {
        _dir: TempDir,
        path: std::path::PathBuf,
        clock: Arc<ManualTimeSource>,
    }

    impl Disk {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("state").join("module-host.json");
            Self {
                _dir: dir,
                path,
                clock: Arc::new(ManualTimeSource::new(START)),
            }
        }

        /// A fresh store handle, as a restarted process would open it.
        fn store(&self) -> Arc<FileDurableStore> {
            Arc::new(FileDurableStore::open(&self.path))
        }

        fn cache(&self, config: CacheConfig) -> VersionedCache {
            VersionedCache::new(config)
                .with_clock(self.clock.clone())
                .with_store(self.store())
        }
    }

    // =============================================================================
    // INTEGRATION TESTS: ROUND TRIP
    // =============================================================================

    /// Live entries come back after a restart; lapsed ones do not.
    #[test]
    fn test_restart_restores_live_entries_only() {
        let disk = Disk::new();
        let cache = disk.cache(CacheConfig::for_testing());
        cache.set(
            "charts",
            CacheEntry::new("charts", "1.2.0", ModuleHandle::new(1u8))
                .with_ttl(Duration::from_secs(60))
                .with_hash("abc123"),
        );
        cache.set(
            "tables",
            CacheEntry::new("tables", "2.0.1", ModuleHandle::new(2u8))
                .with_ttl(Duration::from_secs(5)),
        );
        assert!(cache.persist());
        drop(cache);

        disk.clock.advance(Duration::from_secs(10));
        let restarted = disk.cache(CacheConfig::for_testing());

        assert_eq!(restarted.restore(), 1);
        let charts = restarted.get("charts").expect("charts restored");
        assert_eq!(charts.version, "1.2.0");
        assert_eq!(charts.content_hash.as_deref(), Some("abc123"));
        assert_eq!(charts.created_at, START);
        assert!(charts.module_handle.is_none());
        assert!(!restarted.has("tables"));
    }

    /// Entries already expired at persist time are not written.
    #[test]
    fn test_persist_skips_expired_entries() {
        let disk = Disk::new();
        let cache = disk.cache(CacheConfig::for_testing());
        cache.set(
            "notifications",
            CacheEntry::new("notifications", "0.9.0", ModuleHandle::new(()))
                .with_ttl(Duration::from_secs(1)),
        );
        disk.clock.advance(Duration::from_secs(2));
        assert!(cache.persist());

        let restarted = disk.cache(CacheConfig::for_testing());
        assert_eq!(restarted.restore(), 0);
    }

    /// A persisted entry older than the configured baseline is dropped.
    #[test]
    fn test_restore_honors_baseline_versions() {
        let disk = Disk::new();
        let cache = disk.cache(CacheConfig::for_testing());
        cache.set("charts", CacheEntry::new("charts", "1.0.0", ModuleHandle::new(())));
        cache.set("tables", CacheEntry::new("tables", "2.0.0", ModuleHandle::new(())));
        assert!(cache.persist());

        let mut config = CacheConfig::for_testing();
        config
            .baseline_versions
            .insert("charts".to_string(), "1.1.0".to_string());
        let restarted = disk.cache(config);

        assert_eq!(restarted.restore(), 1);
        assert_eq!(restarted.keys(), vec!["tables".to_string()]);
    }

    // =============================================================================
    // INTEGRATION TESTS: INCOMPATIBLE STORAGE
    // =============================================================================

    /// A different schema major discards persisted records from disk.
    #[test]
    fn test_schema_major_change_resets_storage() {
        let disk = Disk::new();
        let cache = disk.cache(CacheConfig::for_testing());
        cache.set("charts", CacheEntry::new("charts", "1.0.0", ModuleHandle::new(())));
        assert!(cache.persist());

        let config = CacheConfig {
            schema_version: "2.0.0".to_string(),
            ..CacheConfig::for_testing()
        };
        let restarted = disk.cache(config.clone());

        assert_eq!(restarted.restore(), 0);
        assert_eq!(restarted.size(), 0);

        let reopened = disk.store();
        assert!(reopened
            .keys_with_prefix(&config.namespace)
            .unwrap()
            .is_empty());
    }

    /// A minor schema bump still restores.
    #[test]
    fn test_schema_minor_change_restores() {
        let disk = Disk::new();
        let cache = disk.cache(CacheConfig::for_testing());
        cache.set("charts", CacheEntry::new("charts", "1.0.0", ModuleHandle::new(())));
        assert!(cache.persist());

        let restarted = disk.cache(CacheConfig {
            schema_version: "1.4.0".to_string(),
            ..CacheConfig::for_testing()
        });
        assert_eq!(restarted.restore(), 1);
    }

    /// Garbage under the cache keys is deleted and the cache starts cold.
    #[test]
    fn test_corrupted_records_are_deleted() {
        let disk = Disk::new();
        let config = CacheConfig::for_testing();
        let store = disk.store();
        store.put(&config.meta_key(), "{not json").unwrap();
        store.put(&config.entries_key(), "[]").unwrap();

        let cache = VersionedCache::new(config.clone())
            .with_clock(disk.clock.clone())
            .with_store(store.clone());

        assert_eq!(cache.restore(), 0);
        assert!(store.get(&config.meta_key()).unwrap().is_none());
        assert!(store.get(&config.entries_key()).unwrap().is_none());
    }

    // =============================================================================
    // INTEGRATION TESTS: RESTORED ENTRIES AND THE COORDINATOR
    // =============================================================================

    /// A restored entry carries no handle, so the first load goes to the
    /// registry and the resulting handle replaces the record.
    #[tokio::test]
    async fn test_restored_entry_is_reloaded_on_first_use() {
        let disk = Disk::new();
        let cache = disk.cache(CacheConfig::for_testing());
        cache.set("charts", CacheEntry::new("charts", "1.0.0", ModuleHandle::new(())));
        assert!(cache.persist());

        let cache = Arc::new(disk.cache(CacheConfig::for_testing()));
        assert_eq!(cache.restore(), 1);

        let registry = Arc::new(MockModuleRegistry::new());
        let coordinator = LifecycleCoordinator::new(
            LifecycleConfig::for_testing(),
            registry.clone(),
            cache.clone(),
            EventBus::new(BusConfig::for_testing()),
        );

        assert!(matches!(
            coordinator.load("charts@1.0.0").await,
            LoadOutcome::Loaded(_)
        ));
        assert_eq!(registry.load_count("charts"), 1);
        assert!(cache.get("charts").unwrap().module_handle.is_some());
    }
}
