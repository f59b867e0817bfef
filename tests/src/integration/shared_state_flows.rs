//! # Shared State Flows
//!
//! Modules cooperating through the shared key/value table and targeted
//! bus events.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use mh_02_shared_state::{SharedStateConfig, SharedStateStore};
    use parking_lot::Mutex;
    use serde_json::json;
    use shared_bus::{
        event_types, BusConfig, Event, EventBus, EventFilter, EventPayload, SharedStatePayload,
    };
    use shared_types::{DurableStore, InMemoryDurableStore, ManualTimeSource, SYSTEM_OWNER};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn bus() -> EventBus {
        EventBus::new(BusConfig::for_testing())
    }

    fn store_on(bus: &EventBus, durable: &Arc<InMemoryDurableStore>) -> SharedStateStore {
        SharedStateStore::new(bus.clone(), SharedStateConfig::for_testing())
            .with_store(durable.clone())
    }

    fn changes(events: &[Event]) -> Vec<(String, String)> {
        events
            .iter()
            .filter_map(|e| match e.payload.as_shared_state() {
                Some(SharedStatePayload::Change { key, owner, .. }) => {
                    Some((key.clone(), owner.clone()))
                }
                _ => None,
            })
            .collect()
    }

    // =============================================================================
    // INTEGRATION TESTS: PERSISTENCE
    // =============================================================================

    /// A persistent flag survives a restart; a transient value does not.
    #[test]
    fn test_persistent_flag_survives_restart() {
        let durable = Arc::new(InMemoryDurableStore::new());
        let first = store_on(&bus(), &durable);
        first.set("flag", true, "a", true);
        first.set("scratch", json!({"draft": 1}), "a", false);
        assert!(first.persist());

        let restarted_bus = bus();
        let second = store_on(&restarted_bus, &durable);
        assert_eq!(second.restore(), 1);

        let entry = second.get_entry("flag").expect("flag restored");
        assert_eq!(entry.value, json!(true));
        assert_eq!(entry.owner, "a");
        assert!(entry.persistent);
        assert!(second.get("scratch").is_none());
        assert!(restarted_bus.history(None).is_empty());
    }

    /// A corrupted persisted table is removed and the store starts empty.
    #[test]
    fn test_corrupted_persisted_table_is_dropped() {
        let durable = Arc::new(InMemoryDurableStore::new());
        let config = SharedStateConfig::for_testing();
        durable.put(&config.persistent_key(), "not json").unwrap();

        let store = store_on(&bus(), &durable);
        assert_eq!(store.restore(), 0);
        assert!(durable.get(&config.persistent_key()).unwrap().is_none());
    }

    // =============================================================================
    // INTEGRATION TESTS: OWNERSHIP
    // =============================================================================

    /// Only the owner, or the system identity, can delete a key.
    #[test]
    fn test_ownership_enforced_on_delete() {
        let bus = bus();
        let store = SharedStateStore::new(bus.clone(), SharedStateConfig::for_testing());
        store.set("flag", true, "a", false);

        assert!(!store.delete("flag", "b"));
        assert_eq!(store.get("flag"), Some(json!(true)));
        assert!(bus.history(Some(event_types::SHARED_STATE_REMOVE)).is_empty());

        assert!(store.delete("flag", "a"));
        assert!(store.get("flag").is_none());

        store.set("theme", "dark", "a", false);
        assert!(store.delete("theme", SYSTEM_OWNER));
    }

    /// Writing someone else's key transfers ownership to the writer.
    #[test]
    fn test_last_writer_becomes_owner() {
        let bus = bus();
        let store = SharedStateStore::new(bus.clone(), SharedStateConfig::for_testing());
        store.set("selection", json!([1]), "tables", false);
        store.set("selection", json!([2]), "charts", false);

        assert_eq!(store.get_entry("selection").unwrap().owner, "charts");
        assert!(!store.delete("selection", "tables"));
        assert_eq!(
            changes(&bus.history(Some(event_types::SHARED_STATE_CHANGE))),
            vec![
                ("selection".to_string(), "tables".to_string()),
                ("selection".to_string(), "charts".to_string()),
            ]
        );
    }

    /// Unload cleanup removes only the departing module's transient keys.
    #[test]
    fn test_clear_owner_announces_removals_as_system() {
        let bus = bus();
        let store = SharedStateStore::new(bus.clone(), SharedStateConfig::for_testing());
        store.set("a1", 1, "a", false);
        store.set("a2", 2, "a", false);
        store.set("a3", 3, "a", true);
        store.set("b1", 4, "b", false);

        assert_eq!(store.clear_owner("a"), 2);
        assert_eq!(
            store.list_keys(),
            vec!["a3".to_string(), "b1".to_string()]
        );

        let removals = bus.history(Some(event_types::SHARED_STATE_REMOVE));
        assert_eq!(removals.len(), 2);
        assert!(removals.iter().all(|e| e.source == SYSTEM_OWNER));
    }

    /// A persistent key written by a module outlives that module's unload
    /// and is part of the next persisted table.
    #[test]
    fn test_persistent_key_survives_owner_cleanup() {
        let durable = Arc::new(InMemoryDurableStore::new());
        let first = store_on(&bus(), &durable);
        first.set("flag", true, "moduleA", true);
        first.clear_owner("moduleA");
        assert!(first.persist());

        let second = store_on(&bus(), &durable);
        assert_eq!(second.restore(), 1);
        assert_eq!(second.get("flag"), Some(json!(true)));
    }

    // =============================================================================
    // INTEGRATION TESTS: NOTIFICATION
    // =============================================================================

    /// A write by one module is observed by another with old and new values.
    #[test]
    fn test_other_module_observes_change() {
        let bus = bus();
        let store = SharedStateStore::new(bus.clone(), SharedStateConfig::for_testing());
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = observed.clone();
        let _sub = bus.subscribe(event_types::SHARED_STATE_CHANGE, move |event| {
            if let Some(SharedStatePayload::Change {
                key,
                value,
                previous,
                ..
            }) = event.payload.as_shared_state()
            {
                sink.lock().push((key.clone(), value.clone(), previous.clone()));
            }
            Ok(())
        });

        store.set("theme", "light", "charts", false);
        store.set("theme", "dark", "charts", false);

        assert_eq!(
            *observed.lock(),
            vec![
                ("theme".to_string(), json!("light"), None),
                ("theme".to_string(), json!("dark"), Some(json!("light"))),
            ]
        );
    }

    /// A handler may write back into the store while being notified.
    #[test]
    fn test_handler_can_write_during_notification() {
        let bus = bus();
        let store = Arc::new(SharedStateStore::new(
            bus.clone(),
            SharedStateConfig::for_testing(),
        ));
        let mirror = store.clone();
        let _sub = bus.subscribe(event_types::SHARED_STATE_CHANGE, move |event| {
            if let Some(SharedStatePayload::Change { key, value, .. }) =
                event.payload.as_shared_state()
            {
                if key == "theme" {
                    mirror.set("theme-mirror", value.clone(), "tables", false);
                }
            }
            Ok(())
        });

        store.set("theme", "dark", "charts", false);
        assert_eq!(store.get("theme-mirror"), Some(json!("dark")));
    }

    /// A targeted event reaches its target's channel and broadcast
    /// listeners, but not other modules' targeted channels.
    #[test]
    fn test_targeted_event_reaches_only_target() {
        let bus = bus();
        let dashboard = Arc::new(Mutex::new(0));
        let sidebar = Arc::new(Mutex::new(0));
        let (d, s) = (dashboard.clone(), sidebar.clone());
        let _d = bus.subscribe_to("ui:refresh", "dashboard", move |_| {
            *d.lock() += 1;
            Ok(())
        });
        let _s = bus.subscribe_to("ui:refresh", "sidebar", move |_| {
            *s.lock() += 1;
            Ok(())
        });
        let mut all = bus.stream(EventFilter::types(["ui:refresh"]));

        let sent = bus.emit_to(
            "ui:refresh",
            EventPayload::custom(json!({"reason": "theme"})),
            "charts",
            "dashboard",
        );

        assert_eq!(*dashboard.lock(), 1);
        assert_eq!(*sidebar.lock(), 0);
        let received = all.try_recv().unwrap().expect("broadcast copy");
        assert_eq!(received.id, sent.id);
        assert_eq!(received.target.as_deref(), Some("dashboard"));
    }

    /// A late registrant gets the shared-state history on its replay channel.
    #[test]
    fn test_late_registrant_replays_shared_state() {
        let bus = bus();
        let store = SharedStateStore::new(bus.clone(), SharedStateConfig::for_testing());
        store.set("theme", "dark", "charts", false);
        store.set("scratch", 1, "charts", false);
        assert!(store.delete("scratch", "charts"));

        let replayed = Arc::new(Mutex::new(Vec::new()));
        let sink = replayed.clone();
        let _sub = bus.subscribe(
            &format!("replay:{}:sidebar", event_types::SHARED_STATE_CHANGE),
            move |event| {
                sink.lock().push(event.clone());
                Ok(())
            },
        );

        assert_eq!(bus.register_module("sidebar"), 3);
        let replayed = replayed.lock();
        assert_eq!(
            changes(&replayed),
            vec![
                ("theme".to_string(), "charts".to_string()),
                ("scratch".to_string(), "charts".to_string()),
            ]
        );
        assert!(replayed.iter().all(|e| e.target.as_deref() == Some("sidebar")));
    }

    // =============================================================================
    // INTEGRATION TESTS: CONCURRENT ACCESS
    // =============================================================================

    /// Workers writing the store while bus handlers on other workers also
    /// write it all finish, and every change is observed exactly once in
    /// the order it was applied.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_and_writing_handlers() {
        let bus = EventBus::new(BusConfig {
            history_size: 10_000,
            ..BusConfig::for_testing()
        });
        let store = Arc::new(SharedStateStore::new(
            bus.clone(),
            SharedStateConfig::for_testing(),
        ));

        let writer = Arc::downgrade(&store);
        let _ready = bus.subscribe(event_types::READY, move |event| {
            if let Some(store) = writer.upgrade() {
                store.set(&format!("ready.{}", event.source), true, "shell", false);
            }
            Ok(())
        });
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = observed.clone();
        let _changes = bus.subscribe(event_types::SHARED_STATE_CHANGE, move |event| {
            sink.lock().push(event.id);
            Ok(())
        });

        let mut tasks = Vec::new();
        for worker in 0..4 {
            let bus = bus.clone();
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..250 {
                    if i % 5 == 0 {
                        bus.emit(
                            event_types::READY,
                            EventPayload::Empty,
                            &format!("module-{worker}"),
                        );
                    }
                    store.set(&format!("counter.{worker}"), i, "tables", false);
                    tokio::task::yield_now().await;
                }
            }));
        }
        let joined = tokio::time::timeout(Duration::from_secs(10), futures::future::join_all(tasks))
            .await
            .expect("writers did not finish");
        for result in joined {
            result.unwrap();
        }

        for worker in 0..4 {
            assert_eq!(store.get(&format!("counter.{worker}")), Some(json!(249)));
            assert_eq!(store.get(&format!("ready.module-{worker}")), Some(json!(true)));
        }
        let applied: Vec<_> = bus
            .history(Some(event_types::SHARED_STATE_CHANGE))
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(applied.len(), 4 * 250 + 4 * 50);
        assert_eq!(*observed.lock(), applied);
    }

    // =============================================================================
    // INTEGRATION TESTS: SWEEP
    // =============================================================================

    /// Stale transient values are swept; persistent ones stay.
    #[test]
    fn test_sweep_spares_persistent_entries() {
        let clock = Arc::new(ManualTimeSource::new(1_000));
        let bus = EventBus::with_clock(BusConfig::for_testing(), clock.clone());
        let config = SharedStateConfig {
            max_age_secs: 60,
            ..SharedStateConfig::for_testing()
        };
        let store = SharedStateStore::new(bus, config).with_clock(clock.clone());
        store.set("session", "x", "a", false);
        store.set("flag", true, "a", true);

        clock.advance(Duration::from_secs(61));
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.list_keys(), vec!["flag".to_string()]);
    }
}
