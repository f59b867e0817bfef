//! Prometheus metrics for the module host.
//!
//! All metrics follow the naming convention: `mh_<component>_<metric>_<unit>`
//!
//! Counters fed from component statistics (cache hits, bus emits) are
//! advanced with [`sync_counter`], which only ever adds the difference
//! between the component's cumulative count and the exported value.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CACHE METRICS
    // =========================================================================

    pub static ref CACHE_HITS: IntCounter = IntCounter::new(
        "mh_cache_hits_total",
        "Cache lookups that returned a live entry"
    ).expect("metric creation failed");

    pub static ref CACHE_MISSES: IntCounter = IntCounter::new(
        "mh_cache_misses_total",
        "Cache lookups that found nothing or an expired entry"
    ).expect("metric creation failed");

    pub static ref CACHE_EVICTIONS: IntCounter = IntCounter::new(
        "mh_cache_evictions_total",
        "Entries evicted by the LRU policy"
    ).expect("metric creation failed");

    pub static ref CACHE_EXPIRATIONS: IntCounter = IntCounter::new(
        "mh_cache_expirations_total",
        "Entries removed because their TTL elapsed"
    ).expect("metric creation failed");

    pub static ref CACHE_SIZE: IntGauge = IntGauge::new(
        "mh_cache_entries",
        "Entries currently held by the module cache"
    ).expect("metric creation failed");

    // =========================================================================
    // LIFECYCLE METRICS
    // =========================================================================

    /// Load attempts by outcome: ready, update, error
    pub static ref MODULE_LOADS: IntCounterVec = IntCounterVec::new(
        Opts::new("mh_module_loads_total", "Module load attempts by outcome"),
        &["outcome"]
    ).expect("metric creation failed");

    pub static ref MODULE_RECOVERY_FAILURES: IntCounter = IntCounter::new(
        "mh_module_recovery_failures_total",
        "Modules that exhausted their retries"
    ).expect("metric creation failed");

    pub static ref MODULES_LOADED: IntGauge = IntGauge::new(
        "mh_modules_loaded",
        "Modules currently in the loaded state"
    ).expect("metric creation failed");

    // =========================================================================
    // EVENT BUS METRICS
    // =========================================================================

    pub static ref EVENTS_EMITTED: IntCounter = IntCounter::new(
        "mh_bus_events_emitted_total",
        "Events emitted on the bus"
    ).expect("metric creation failed");

    pub static ref HANDLER_FAILURES: IntCounter = IntCounter::new(
        "mh_bus_handler_failures_total",
        "Handlers that returned an error or panicked"
    ).expect("metric creation failed");

    // =========================================================================
    // SHARED STATE METRICS
    // =========================================================================

    /// Shared-state mutations by kind: change, remove
    pub static ref SHARED_STATE_WRITES: IntCounterVec = IntCounterVec::new(
        Opts::new("mh_shared_state_writes_total", "Shared-state mutations by kind"),
        &["kind"]
    ).expect("metric creation failed");

    pub static ref SHARED_STATE_KEYS: IntGauge = IntGauge::new(
        "mh_shared_state_keys",
        "Keys currently held by the shared-state store"
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Idempotent: metrics already registered are skipped.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Cache
        Box::new(CACHE_HITS.clone()),
        Box::new(CACHE_MISSES.clone()),
        Box::new(CACHE_EVICTIONS.clone()),
        Box::new(CACHE_EXPIRATIONS.clone()),
        Box::new(CACHE_SIZE.clone()),
        // Lifecycle
        Box::new(MODULE_LOADS.clone()),
        Box::new(MODULE_RECOVERY_FAILURES.clone()),
        Box::new(MODULES_LOADED.clone()),
        // Event Bus
        Box::new(EVENTS_EMITTED.clone()),
        Box::new(HANDLER_FAILURES.clone()),
        // Shared State
        Box::new(SHARED_STATE_WRITES.clone()),
        Box::new(SHARED_STATE_KEYS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Advance `counter` to a component's cumulative `total`.
///
/// A total below the exported value (component restarted) is ignored.
pub fn sync_counter(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}
