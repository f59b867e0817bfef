//! # Metrics Wiring
//!
//! Lifecycle and shared-state events are counted as they happen; cumulative
//! component statistics are sampled on an interval.

use mh_01_versioned_cache::VersionedCache;
use mh_02_shared_state::SharedStateStore;
use mh_03_lifecycle::LifecycleCoordinator;
use module_telemetry::{
    sync_counter, CACHE_EVICTIONS, CACHE_EXPIRATIONS, CACHE_HITS, CACHE_MISSES, CACHE_SIZE,
    EVENTS_EMITTED, HANDLER_FAILURES, MODULES_LOADED, MODULE_LOADS, MODULE_RECOVERY_FAILURES,
    SHARED_STATE_KEYS, SHARED_STATE_WRITES,
};
use shared_bus::{event_types, Event, EventBus, HandlerResult, Subscription};
use shared_types::LifecycleState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Count lifecycle outcomes and shared-state writes until the returned
/// subscriptions are dropped.
pub fn subscribe_metrics(bus: &EventBus) -> Vec<Subscription> {
    let outcome = |label: &'static str| {
        move |_: &Event| -> HandlerResult {
            MODULE_LOADS.with_label_values(&[label]).inc();
            Ok(())
        }
    };
    let write = |label: &'static str| {
        move |_: &Event| -> HandlerResult {
            SHARED_STATE_WRITES.with_label_values(&[label]).inc();
            Ok(())
        }
    };

    vec![
        bus.subscribe(event_types::READY, outcome("ready")),
        bus.subscribe(event_types::UPDATE, outcome("update")),
        bus.subscribe(event_types::ERROR, outcome("error")),
        bus.subscribe(event_types::RECOVERY_FAILED, |_| {
            MODULE_RECOVERY_FAILURES.inc();
            Ok(())
        }),
        bus.subscribe(event_types::SHARED_STATE_CHANGE, write("change")),
        bus.subscribe(event_types::SHARED_STATE_REMOVE, write("remove")),
    ]
}

/// Components whose statistics are exported.
#[derive(Clone)]
pub struct MetricsSources {
    pub bus: EventBus,
    pub cache: Arc<VersionedCache>,
    pub shared_state: Arc<SharedStateStore>,
    pub coordinator: LifecycleCoordinator,
}

impl MetricsSources {
    /// Copy current statistics into the exported metrics.
    pub fn sample(&self) {
        let cache = self.cache.stats();
        sync_counter(&CACHE_HITS, cache.hits);
        sync_counter(&CACHE_MISSES, cache.misses);
        sync_counter(&CACHE_EVICTIONS, cache.evictions);
        sync_counter(&CACHE_EXPIRATIONS, cache.expirations);
        CACHE_SIZE.set(gauge_value(cache.size));

        let bus = self.bus.stats();
        sync_counter(&EVENTS_EMITTED, bus.events_emitted);
        sync_counter(&HANDLER_FAILURES, bus.handler_failures);

        SHARED_STATE_KEYS.set(gauge_value(self.shared_state.len()));

        let loaded = self
            .coordinator
            .records()
            .iter()
            .filter(|record| record.state == LifecycleState::Loaded)
            .count();
        MODULES_LOADED.set(gauge_value(loaded));
    }
}

fn gauge_value(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

pub fn spawn_metrics_sampler(
    sources: MetricsSources,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => sources.sample(),
                _ = shutdown.changed() => {
                    sources.sample();
                    debug!("Metrics sampler stopped");
                    break;
                }
            }
        }
    })
}
