//! # Module Host
//!
//! Demo host for the module substrate.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (`MH_CONFIG` file, then `MH_*` variables)
//! 2. Initialize logging and metrics
//! 3. Build the context over the demo registry and restore persisted state
//! 4. Register, announce and load the demo modules
//! 5. Exercise shared state and discovery, log statistics
//! 6. Wait for Ctrl+C, then shut down and persist

use std::sync::Arc;

use anyhow::{Context, Result};
use mh_03_lifecycle::LoadOutcome;
use module_runtime::demo::{demo_registry, BROKEN_MODULE, DEMO_MODULES};
use module_runtime::{HostConfig, ModuleHostContext};
use shared_bus::{EventFilter, ModuleDiscovery};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = HostConfig::load().context("Failed to load configuration")?;
    module_telemetry::init_telemetry(&config.telemetry)
        .context("Failed to initialize telemetry")?;

    info!("===========================================");
    info!("  Module Host v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let registry = Arc::new(demo_registry());
    let ctx = ModuleHostContext::builder(config)
        .registry(registry)
        .build()
        .context("Failed to build module host")?;
    let restored = ctx.start().await;
    info!(
        cache_entries = restored.cache_restored,
        shared_keys = restored.state_restored,
        "Persisted state restored"
    );

    let mut lifecycle = ctx.bus().stream(EventFilter::prefix("module:"));
    tokio::spawn(async move {
        while let Some(event) = lifecycle.recv().await {
            info!(event_type = %event.event_type, source = %event.source, "Lifecycle event");
        }
    });

    // Keep the announcements alive for the life of the host.
    let mut announcements = Vec::new();
    for (name, version, capabilities) in DEMO_MODULES {
        ctx.coordinator()
            .register(name, &format!("static:{name}"))
            .await
            .with_context(|| format!("Failed to register {name}"))?;
        ctx.bus().register_module(name);

        let mut discovery = ModuleDiscovery::new(name).with_version(version);
        for capability in capabilities {
            discovery = discovery.with_capability(*capability);
        }
        announcements.push(ctx.bus().announce(discovery));

        match ctx.load(&format!("{name}@{version}")).await {
            LoadOutcome::Cached(_) => info!(module = %name, "Served from cache"),
            outcome if outcome.is_success() => info!(module = %name, "Loaded"),
            outcome => warn!(module = %name, ?outcome, "Load did not succeed"),
        }
    }

    // Retries run in the background; recovery failure is reported on the bus.
    let broken = ctx.load(BROKEN_MODULE).await;
    warn!(module = BROKEN_MODULE, ?broken, "Expected failure");

    let state = ctx.shared_state();
    state.set("theme", "dark", "charts", true);
    state.set("selection", serde_json::json!({"rows": [1, 2, 3]}), "tables", false);
    info!(keys = ?state.list_keys(), "Shared state populated");

    let found = ctx.bus().discover_modules("module-host").await;
    info!(
        modules = ?found.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
        "Discovery complete"
    );

    ctx.sample_metrics();
    let cache_stats = ctx.cache().stats();
    info!(
        size = cache_stats.size,
        hits = cache_stats.hits,
        misses = cache_stats.misses,
        bytes = cache_stats.total_estimated_bytes,
        "Cache statistics"
    );
    for record in ctx.coordinator().records() {
        info!(
            module = %record.name,
            state = %record.state,
            retries = record.retry_count,
            "Module record"
        );
    }

    info!("Module host is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    drop(announcements);
    let report = ctx.shutdown().await;
    if !report.cache_persisted || !report.state_persisted {
        warn!(?report, "Persistence on shutdown was incomplete");
    }
    match module_telemetry::encode_metrics() {
        Ok(text) => info!(bytes = text.len(), "Final metrics encoded"),
        Err(e) => warn!(error = %e, "Failed to encode metrics"),
    }

    Ok(())
}
