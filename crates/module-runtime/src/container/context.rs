//! # Module Host Context
//!
//! Holds one instance of every component and the background tasks that
//! serve them. Components reach each other only through this context, so
//! several independent hosts can live in one process (tests do this).
//!
//! ## Start Sequence
//!
//! 1. Restore the cache and persistent shared state (if enabled)
//! 2. Subscribe metric counters to the bus
//! 3. Spawn cache cleanup, shared-state sweep, owner cleanup, metrics
//!    sampling and (if enabled) periodic persistence
//!
//! ## Shutdown Sequence
//!
//! 1. Cancel pending retry timers
//! 2. Signal every background task and wait for it
//! 3. Persist the cache and persistent shared state

use crate::container::config::{ConfigError, HostConfig};
use crate::wiring::{
    spawn_metrics_sampler, spawn_owner_cleanup, spawn_persist_task, subscribe_metrics,
    MetricsSources,
};
use mh_01_versioned_cache::{spawn_cleanup_task, VersionedCache};
use mh_02_shared_state::{spawn_sweep_task, SharedStateStore};
use mh_03_lifecycle::{LifecycleCoordinator, LoadOutcome, ModuleRegistry, StaticModuleRegistry};
use parking_lot::Mutex;
use shared_bus::{EventBus, Subscription};
use shared_types::{DurableStore, FileDurableStore, SystemTimeSource, TimeSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// What `start` restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartReport {
    pub cache_restored: usize,
    pub state_restored: usize,
}

/// What `shutdown` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub retries_cancelled: usize,
    pub cache_persisted: bool,
    pub state_persisted: bool,
}

/// Builder for [`ModuleHostContext`].
#[must_use]
pub struct ModuleHostBuilder {
    config: HostConfig,
    registry: Option<Arc<dyn ModuleRegistry>>,
    store: Option<Arc<dyn DurableStore>>,
    clock: Option<Arc<dyn TimeSource>>,
}

impl ModuleHostBuilder {
    /// Registry used by the lifecycle coordinator. Defaults to an empty
    /// [`StaticModuleRegistry`].
    pub fn registry(mut self, registry: Arc<dyn ModuleRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Durable store shared by cache and shared state. Defaults to a
    /// [`FileDurableStore`] at `config.store_path()`.
    pub fn store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Wall clock for every component.
    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<ModuleHostContext, ConfigError> {
        let config = self.config;
        config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemTimeSource));
        let store: Arc<dyn DurableStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileDurableStore::open(config.store_path())),
        };
        let registry: Arc<dyn ModuleRegistry> = self
            .registry
            .unwrap_or_else(|| Arc::new(StaticModuleRegistry::new()));

        let bus = EventBus::with_clock(config.bus.clone(), clock.clone());
        let cache = Arc::new(
            VersionedCache::new(config.cache.clone())
                .with_clock(clock.clone())
                .with_store(store.clone()),
        );
        let shared_state = Arc::new(
            SharedStateStore::new(bus.clone(), config.shared_state.clone())
                .with_clock(clock)
                .with_store(store.clone()),
        );
        let coordinator = LifecycleCoordinator::new(
            config.lifecycle.clone(),
            registry.clone(),
            cache.clone(),
            bus.clone(),
        );
        let (shutdown_tx, _) = watch::channel(false);

        info!(
            data_dir = %config.data_dir.display(),
            cache_max_size = config.cache.max_size,
            max_retries = config.lifecycle.retry.max_retries,
            "Module host context created"
        );

        Ok(ModuleHostContext {
            config,
            bus,
            cache,
            shared_state,
            coordinator,
            registry,
            store,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }
}

/// The module host: bus, cache, shared state and coordinator.
pub struct ModuleHostContext {
    config: HostConfig,
    bus: EventBus,
    cache: Arc<VersionedCache>,
    shared_state: Arc<SharedStateStore>,
    coordinator: LifecycleCoordinator,
    registry: Arc<dyn ModuleRegistry>,
    store: Arc<dyn DurableStore>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<Subscription>>,
    started: AtomicBool,
}

impl ModuleHostContext {
    pub fn builder(config: HostConfig) -> ModuleHostBuilder {
        ModuleHostBuilder {
            config,
            registry: None,
            store: None,
            clock: None,
        }
    }

    /// Restore persisted state and start background tasks.
    ///
    /// Must be called from within a tokio runtime. A second call is a
    /// no-op returning an empty report.
    pub async fn start(&self) -> StartReport {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Module host already started");
            return StartReport::default();
        }

        let mut report = StartReport::default();
        if self.config.restore_on_start {
            report.cache_restored = self.cache.restore();
            report.state_restored = self.shared_state.restore();
        }

        self.subscriptions.lock().extend(subscribe_metrics(&self.bus));

        let sources = self.metrics_sources();
        let mut tasks = vec![
            spawn_cleanup_task(self.cache.clone(), self.shutdown_tx.subscribe()),
            spawn_sweep_task(self.shared_state.clone(), self.shutdown_tx.subscribe()),
            spawn_owner_cleanup(
                &self.bus,
                self.shared_state.clone(),
                self.shutdown_tx.subscribe(),
            ),
            spawn_metrics_sampler(
                sources,
                self.config.metrics_interval(),
                self.shutdown_tx.subscribe(),
            ),
        ];
        if let Some(period) = self.config.persist_interval() {
            tasks.push(spawn_persist_task(
                self.cache.clone(),
                self.shared_state.clone(),
                period,
                self.shutdown_tx.subscribe(),
            ));
        }
        let task_count = tasks.len();
        self.tasks.lock().extend(tasks);

        info!(
            cache_restored = report.cache_restored,
            state_restored = report.state_restored,
            tasks = task_count,
            "Module host started"
        );
        report
    }

    /// Stop background tasks, cancel retries and persist.
    pub async fn shutdown(&self) -> ShutdownReport {
        info!("Initiating graceful shutdown...");
        let retries_cancelled = self.coordinator.cancel_retries();
        self.shutdown_tx.send_replace(true);

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        self.subscriptions.lock().clear();

        let report = ShutdownReport {
            retries_cancelled,
            cache_persisted: self.cache.persist(),
            state_persisted: self.shared_state.persist(),
        };
        info!(
            retries_cancelled = report.retries_cancelled,
            cache_persisted = report.cache_persisted,
            state_persisted = report.state_persisted,
            "Shutdown complete"
        );
        report
    }

    /// Load `"name"` or `"name@version"` through the coordinator.
    pub async fn load(&self, specifier: &str) -> LoadOutcome {
        self.coordinator.load(specifier).await
    }

    pub async fn unload(&self, name: &str) -> bool {
        self.coordinator.unload(name).await
    }

    /// Sample component statistics into metrics now.
    pub fn sample_metrics(&self) {
        self.metrics_sources().sample();
    }

    fn metrics_sources(&self) -> MetricsSources {
        MetricsSources {
            bus: self.bus.clone(),
            cache: self.cache.clone(),
            shared_state: self.shared_state.clone(),
            coordinator: self.coordinator.clone(),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn cache(&self) -> &Arc<VersionedCache> {
        &self.cache
    }

    pub fn shared_state(&self) -> &Arc<SharedStateStore> {
        &self.shared_state
    }

    pub fn coordinator(&self) -> &LifecycleCoordinator {
        &self.coordinator
    }

    pub fn registry(&self) -> &Arc<dyn ModuleRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ModuleHostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHostContext")
            .field("data_dir", &self.config.data_dir)
            .field("started", &self.is_started())
            .field("coordinator", &self.coordinator)
            .finish()
    }
}
