//! # Lifecycle Flows
//!
//! The coordinator driving a registry, the versioned cache and the event
//! bus together, observed the way a UI layer would observe it: through
//! `module:*` events only.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use mh_01_versioned_cache::{CacheConfig, VersionedCache};
    use mh_03_lifecycle::{
        LifecycleConfig, LifecycleCoordinator, LoadOutcome, MockModule, MockModuleRegistry,
        RetryPolicy,
    };
    use parking_lot::Mutex;
    use shared_bus::{event_types, BusConfig, EventBus, EventFilter, LifecyclePayload, Subscription};
    use shared_types::LifecycleState;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Fixture {
        bus: EventBus,
        cache: Arc<VersionedCache>,
        registry: Arc<MockModuleRegistry>,
        coordinator: LifecycleCoordinator,
    }

    fn fixture_with(registry: MockModuleRegistry, retry: RetryPolicy) -> Fixture {
        let bus = EventBus::new(BusConfig::for_testing());
        let cache = Arc::new(VersionedCache::new(CacheConfig::for_testing()));
        let registry = Arc::new(registry);
        let coordinator = LifecycleCoordinator::new(
            LifecycleConfig {
                retry,
                ..LifecycleConfig::for_testing()
            },
            registry.clone(),
            cache.clone(),
            bus.clone(),
        );
        Fixture {
            bus,
            cache,
            registry,
            coordinator,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockModuleRegistry::new(), RetryPolicy::for_testing())
    }

    /// Record every `module:*` event as `type` or `type:new_state`.
    fn record_lifecycle(bus: &EventBus) -> (Arc<Mutex<Vec<String>>>, Vec<Subscription>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscriptions = [
            event_types::STATE_CHANGE,
            event_types::READY,
            event_types::ERROR,
            event_types::UPDATE,
            event_types::RECOVERY_FAILED,
        ]
        .into_iter()
        .map(|event_type| {
            let sink = seen.clone();
            bus.subscribe(event_type, move |event| {
                let label = match event.payload.as_lifecycle() {
                    Some(LifecyclePayload::StateChange { new_state, .. }) => {
                        format!("state:{new_state}")
                    }
                    _ => event.event_type.clone(),
                };
                sink.lock().push(label);
                Ok(())
            })
        })
        .collect();
        (seen, subscriptions)
    }

    // =============================================================================
    // INTEGRATION TESTS: COLD LOAD
    // =============================================================================

    /// Loading charts@1.0.0 into an empty cache emits loading, ready, loaded.
    #[tokio::test]
    async fn test_cold_load_emits_loading_ready_loaded() {
        let f = fixture();
        let (seen, _subs) = record_lifecycle(&f.bus);

        let outcome = f.coordinator.load("charts@1.0.0").await;

        assert!(matches!(outcome, LoadOutcome::Loaded(_)));
        assert_eq!(
            *seen.lock(),
            vec!["state:loading", "module:ready", "state:loaded"]
        );
        let entry = f.cache.get("charts").expect("charts should be cached");
        assert_eq!(entry.version, "1.0.0");
        assert!(entry.module_handle.is_some());
    }

    /// A subscriber reacting to `loaded` can already read the module from
    /// the cache.
    #[tokio::test]
    async fn test_loaded_observer_reads_cache() {
        let f = fixture();
        let cache = f.cache.clone();
        let observed = Arc::new(Mutex::new(None));
        let sink = observed.clone();
        let _sub = f.bus.subscribe(event_types::STATE_CHANGE, move |event| {
            if let Some(LifecyclePayload::StateChange {
                name,
                new_state: LifecycleState::Loaded,
                ..
            }) = event.payload.as_lifecycle()
            {
                *sink.lock() = cache.get(name).map(|entry| entry.version);
            }
            Ok(())
        });

        f.coordinator.load("charts").await;
        assert_eq!(observed.lock().as_deref(), Some("1.0.0"));
    }

    // =============================================================================
    // INTEGRATION TESTS: CONCURRENCY
    // =============================================================================

    /// Concurrent loads of one module produce exactly one registry call.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_loads_single_registry_call() {
        let f = fixture_with(
            MockModuleRegistry::new().with_delay(Duration::from_millis(50)),
            RetryPolicy::for_testing(),
        );

        let loads: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = f.coordinator.clone();
                tokio::spawn(async move { coordinator.load("charts").await })
            })
            .collect();
        let outcomes = futures::future::join_all(loads).await;

        assert_eq!(f.registry.load_count("charts"), 1);
        let handles: Vec<_> = outcomes
            .into_iter()
            .map(|joined| joined.unwrap().handle().cloned().unwrap())
            .collect();
        assert!(handles.windows(2).all(|pair| pair[0].ptr_eq(&pair[1])));
    }

    /// Different modules load independently and in parallel.
    #[tokio::test(start_paused = true)]
    async fn test_distinct_modules_load_independently() {
        let f = fixture_with(
            MockModuleRegistry::new().with_delay(Duration::from_millis(50)),
            RetryPolicy::for_testing(),
        );
        let (a, b) = tokio::join!(f.coordinator.load("charts"), f.coordinator.load("tables"));
        assert!(a.is_success() && b.is_success());
        assert_eq!(f.cache.keys().len(), 2);
    }

    // =============================================================================
    // INTEGRATION TESTS: RETRY AND RECOVERY
    // =============================================================================

    /// Three consecutive failures with max_retries=3 end in recovery-failed.
    #[tokio::test(start_paused = true)]
    async fn test_three_failures_end_in_recovery_failed() {
        let f = fixture();
        f.registry.fail_always("charts", true);
        let (seen, _subs) = record_lifecycle(&f.bus);

        f.coordinator.load("charts").await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        f.coordinator.wait_idle("charts").await;

        assert_eq!(f.registry.load_count("charts"), 3);
        assert_eq!(
            seen.lock().last().map(String::as_str),
            Some(event_types::RECOVERY_FAILED)
        );
        assert_eq!(f.coordinator.state("charts"), Some(LifecycleState::Error));

        let errors = f.bus.history(Some(event_types::ERROR));
        let attempts: Vec<u32> = errors
            .iter()
            .filter_map(|e| match e.payload.as_lifecycle() {
                Some(LifecyclePayload::Error { attempt, .. }) => Some(*attempt),
                _ => None,
            })
            .collect();
        assert_eq!(attempts, vec![1, 2, 3]);
    }

    /// Backoff doubles between attempts.
    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_doubles() {
        let f = fixture_with(
            MockModuleRegistry::new(),
            RetryPolicy {
                max_retries: 3,
                base_delay_ms: 100,
                max_delay_ms: 10_000,
                factor: 2.0,
            },
        );
        f.registry.fail_always("charts", true);

        f.coordinator.load("charts").await;

        // Retries are due at 100ms and 100 + 200 = 300ms.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.registry.load_count("charts"), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        f.coordinator.wait_idle("charts").await;
        assert_eq!(f.registry.load_count("charts"), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.registry.load_count("charts"), 2);
        tokio::time::sleep(Duration::from_millis(100)).await;
        f.coordinator.wait_idle("charts").await;
        assert_eq!(f.registry.load_count("charts"), 3);
    }

    /// A module whose retries are exhausted can be loaded again explicitly.
    #[tokio::test(start_paused = true)]
    async fn test_exhausted_module_remains_retryable() {
        let f = fixture();
        f.registry.fail_next("charts", 3);

        f.coordinator.load("charts").await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        f.coordinator.wait_idle("charts").await;
        assert_eq!(f.coordinator.state("charts"), Some(LifecycleState::Error));

        let outcome = f.coordinator.load("charts").await;
        assert!(matches!(outcome, LoadOutcome::Loaded(_)));
        assert_eq!(f.coordinator.record("charts").unwrap().retry_count, 0);
    }

    /// Unloading while a retry timer is pending cancels the timer.
    #[tokio::test(start_paused = true)]
    async fn test_unload_cancels_retry_timer() {
        let f = fixture();
        f.registry.fail_next("charts", 1);

        f.coordinator.load("charts").await;
        assert!(f.coordinator.unload("charts").await);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(f.registry.load_count("charts"), 1);
        assert!(!f.cache.has("charts"));
        assert_eq!(f.coordinator.state("charts"), None);
    }

    // =============================================================================
    // INTEGRATION TESTS: HOT SWAP
    // =============================================================================

    /// A newer version replaces the loaded module and announces both handles.
    #[tokio::test]
    async fn test_hot_swap_announces_old_and_new_handles() {
        let f = fixture();
        f.coordinator.load("charts@1.0.0").await;
        f.registry.set_version("charts", "1.1.0");

        let mut updates = f.bus.stream(EventFilter::types([event_types::UPDATE]));
        f.coordinator.load("charts@1.1.0").await;

        let event = updates.try_recv().unwrap().expect("update event");
        match event.payload.as_lifecycle() {
            Some(LifecyclePayload::Update {
                old_handle: Some(old),
                new_handle,
                ..
            }) => {
                assert_eq!(old.downcast_ref::<MockModule>().unwrap().version, "1.0.0");
                assert_eq!(new_handle.downcast_ref::<MockModule>().unwrap().version, "1.1.0");
            }
            other => panic!("expected update payload, got {other:?}"),
        }
        assert_eq!(f.coordinator.state("charts"), Some(LifecycleState::Loaded));
    }

    /// An older requested version is satisfied by the cached newer one.
    #[tokio::test]
    async fn test_older_request_served_from_cache() {
        let f = fixture();
        f.registry.set_version("charts", "2.0.0");
        f.coordinator.load("charts@2.0.0").await;

        assert!(matches!(
            f.coordinator.load("charts@1.5.0").await,
            LoadOutcome::Cached(_)
        ));
        assert_eq!(f.registry.load_count("charts"), 1);
    }

    /// A failed hot swap leaves the module in error, not loaded.
    #[tokio::test]
    async fn test_failed_hot_swap_reverts_to_error() {
        let f = fixture();
        f.coordinator.load("charts").await;
        f.registry.fail_next("charts", 1);

        let outcome = f.coordinator.update("charts").await;

        assert!(matches!(outcome, LoadOutcome::Failed { attempt: 1, .. }));
        assert_eq!(f.coordinator.state("charts"), Some(LifecycleState::Error));
        f.coordinator.cancel_retries();
    }

    // =============================================================================
    // INTEGRATION TESTS: REPLAY
    // =============================================================================

    /// A module registering after charts loaded receives the lifecycle
    /// events it missed on its replay channels.
    #[tokio::test]
    async fn test_late_module_receives_replay() {
        let f = fixture();
        f.coordinator.load("charts").await;

        let replayed = Arc::new(Mutex::new(Vec::new()));
        let sink = replayed.clone();
        let _sub = f.bus.subscribe(
            &format!("replay:{}:dashboard", event_types::READY),
            move |event| {
                let name = event.payload.as_lifecycle().map(|p| p.module_name().to_string());
                sink.lock().push(name);
                Ok(())
            },
        );

        let count = f.bus.register_module("dashboard");

        assert_eq!(count, 3);
        assert_eq!(*replayed.lock(), vec![Some("charts".to_string())]);
    }
}
