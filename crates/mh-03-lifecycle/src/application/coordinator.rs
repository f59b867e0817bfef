//! # Lifecycle Coordinator
//!
//! Drives registry calls, cache writes and lifecycle events for every
//! module.
//!
//! ## State Machine
//!
//! ```text
//! [UNLOADED] ──load──→ [LOADING] ──ok──→ [LOADED] ──unload──→ [UNLOADING] ──→ [UNLOADED]
//!                          │                │  ↑
//!                          │          update│  │ok
//!                          │                ↓  │
//!                          │            [UPDATING]
//!                          │                │
//!                          └──fail──→ [ERROR] ←──fail
//!                                      │  ↑
//!                            retry/load│  │ fail (retry_count += 1)
//!                                      ↓  │
//!                                   [LOADING]
//! ```
//!
//! ## Guarantees
//!
//! - At most one registry operation in flight per module. Concurrent
//!   `load` calls join the running operation and share its outcome.
//! - On success the cache is written before `module:ready` and the
//!   `loaded` state change are emitted, in that order.
//! - Load failures never surface as errors. They are reported through
//!   `module:error` and, once retries are exhausted,
//!   `module:recovery-failed`.
//! - A pending retry timer is cancelled by `unload` and by an explicit
//!   `load`.

use crate::config::LifecycleConfig;
use crate::domain::{LifecycleError, LoadOutcome, ModuleRecord, RegistryError};
use crate::ports::{LoadedModule, ModuleRegistry};
use futures::future::{BoxFuture, FutureExt, Shared};
use mh_01_versioned_cache::{needs_update, CacheEntry, VersionedCache};
use parking_lot::Mutex;
use shared_bus::{event_types, EventBus, EventPayload, LifecyclePayload};
use shared_types::{LifecycleState, ModuleHandle, ModuleName, ModuleSpecifier};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

type SharedOutcome = Shared<BoxFuture<'static, LoadOutcome>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Load,
    Update,
}

impl OpKind {
    fn busy_state(self) -> LifecycleState {
        match self {
            Self::Load => LifecycleState::Loading,
            Self::Update => LifecycleState::Updating,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Caller asked for the module.
    Explicit,
    /// Caller asked for a hot swap.
    Update,
    /// A retry timer fired.
    Retry,
}

enum Begin {
    Ready(LoadOutcome),
    Running(SharedOutcome),
}

enum UnloadStep {
    Wait(SharedOutcome),
    Proceed(LifecycleState),
    Done(bool),
}

struct Tracked {
    record: ModuleRecord,
    in_flight: Option<SharedOutcome>,
    retry_timer: Option<AbortHandle>,
}

impl Tracked {
    fn cancel_retry(&mut self) -> bool {
        self.record.retry_pending = false;
        match self.retry_timer.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }
}

struct CoordinatorInner {
    config: LifecycleConfig,
    registry: Arc<dyn ModuleRegistry>,
    cache: Arc<VersionedCache>,
    bus: EventBus,
    modules: Mutex<HashMap<ModuleName, Tracked>>,
}

/// Lifecycle coordinator.
///
/// Cloning is cheap; clones drive the same set of modules.
#[derive(Clone)]
pub struct LifecycleCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl LifecycleCoordinator {
    #[must_use]
    pub fn new(
        config: LifecycleConfig,
        registry: Arc<dyn ModuleRegistry>,
        cache: Arc<VersionedCache>,
        bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                registry,
                cache,
                bus,
                modules: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<dyn ModuleRegistry> {
        &self.inner.registry
    }

    pub fn cache(&self) -> &Arc<VersionedCache> {
        &self.inner.cache
    }

    /// Register `name` with the registry and start tracking it as
    /// `unloaded`.
    pub async fn register(&self, name: &str, locator: &str) -> Result<(), LifecycleError> {
        if name.trim().is_empty() {
            return Err(LifecycleError::InvalidName(name.to_string()));
        }
        self.inner.registry.register(name, locator).await?;

        let now = self.inner.bus.now();
        self.inner
            .modules
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Tracked {
                record: ModuleRecord::new(name, now),
                in_flight: None,
                retry_timer: None,
            });
        debug!(module = %name, locator = %locator, "Module tracked");
        Ok(())
    }

    /// Load `"name"` or `"name@version"`.
    pub async fn load(&self, specifier: &str) -> LoadOutcome {
        self.load_with(&ModuleSpecifier::parse(specifier), None).await
    }

    /// Load with an explicit content hash requirement.
    ///
    /// A cached handle is reused unless the cache `needs_update` for the
    /// requested version and hash. A module already `loaded` whose cached
    /// entry is stale (or gone) is hot-swapped through `updating`.
    pub async fn load_with(&self, spec: &ModuleSpecifier, hash: Option<&str>) -> LoadOutcome {
        match self.inner.begin(spec, hash, Trigger::Explicit) {
            Begin::Ready(outcome) => outcome,
            Begin::Running(running) => running.await,
        }
    }

    /// Hot-swap a loaded module. Modules that are not loaded get a regular
    /// load.
    pub async fn update(&self, name: &str) -> LoadOutcome {
        let spec = ModuleSpecifier {
            name: name.to_string(),
            version: None,
        };
        match self.inner.begin(&spec, None, Trigger::Update) {
            Begin::Ready(outcome) => outcome,
            Begin::Running(running) => running.await,
        }
    }

    /// Unload `name` and stop tracking it.
    ///
    /// Cancels a pending retry, waits for an in-flight operation, removes
    /// the cache entry and releases registry resources. Registry failures
    /// are logged; the module still ends `unloaded`.
    ///
    /// Returns false if the module was not tracked.
    pub async fn unload(&self, name: &str) -> bool {
        let from = loop {
            match self.inner.unload_step(name) {
                UnloadStep::Wait(running) => {
                    running.await;
                }
                UnloadStep::Proceed(from) => break from,
                UnloadStep::Done(found) => return found,
            }
        };
        let inner = &self.inner;
        inner.emit_state_change(name, from, LifecycleState::Unloading);

        inner.cache.delete(name);

        let released = AssertUnwindSafe(inner.registry.unload(name))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(RegistryError::UnloadFailed {
                    name: name.to_string(),
                    reason: "registry panicked".to_string(),
                })
            });
        if let Err(e) = released {
            warn!(module = %name, error = %e, "Registry unload failed; module unloaded anyway");
        }

        {
            let now = inner.bus.now();
            let mut modules = inner.modules.lock();
            if let Some(mut tracked) = modules.remove(name) {
                tracked.record.transition(LifecycleState::Unloaded, now);
            }
        }
        inner.emit_state_change(name, LifecycleState::Unloading, LifecycleState::Unloaded);
        info!(module = %name, "Module unloaded");
        true
    }

    /// Current state, if tracked.
    pub fn state(&self, name: &str) -> Option<LifecycleState> {
        self.inner
            .modules
            .lock()
            .get(name)
            .map(|tracked| tracked.record.state)
    }

    pub fn record(&self, name: &str) -> Option<ModuleRecord> {
        self.inner
            .modules
            .lock()
            .get(name)
            .map(|tracked| tracked.record.clone())
    }

    /// All tracked records, sorted by name.
    pub fn records(&self) -> Vec<ModuleRecord> {
        let mut records: Vec<ModuleRecord> = self
            .inner
            .modules
            .lock()
            .values()
            .map(|tracked| tracked.record.clone())
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Resolves once no operation is in flight for `name`.
    pub async fn wait_idle(&self, name: &str) {
        loop {
            let running = self
                .inner
                .modules
                .lock()
                .get(name)
                .and_then(|tracked| tracked.in_flight.clone());
            match running {
                Some(running) => {
                    running.await;
                }
                None => return,
            }
        }
    }

    /// Cancel every pending retry timer. Returns how many were cancelled.
    pub fn cancel_retries(&self) -> usize {
        let cancelled = self
            .inner
            .modules
            .lock()
            .values_mut()
            .filter(|tracked| tracked.retry_timer.is_some())
            .map(Tracked::cancel_retry)
            .filter(|cancelled| *cancelled)
            .count();
        if cancelled > 0 {
            info!(cancelled, "Pending retries cancelled");
        }
        cancelled
    }
}

impl std::fmt::Debug for LifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCoordinator")
            .field("config", &self.inner.config)
            .field("modules", &self.inner.modules.lock().len())
            .finish()
    }
}

impl CoordinatorInner {
    /// Decide what a load request does and, if needed, start it.
    fn begin(
        self: &Arc<Self>,
        spec: &ModuleSpecifier,
        hash: Option<&str>,
        trigger: Trigger,
    ) -> Begin {
        let name = spec.name.as_str();
        if name.trim().is_empty() {
            return Begin::Ready(LoadOutcome::Rejected {
                reason: "empty module name".to_string(),
            });
        }

        // Read the cache before taking the module lock: an expired entry is
        // disposed during `get` and its hook may call back into us.
        let cached = self.cache.get(name);
        let cached_handle = cached.as_ref().and_then(|entry| entry.module_handle.clone());
        let satisfied = cached.as_ref().is_some_and(|entry| {
            entry.module_handle.is_some()
                && !needs_update(
                    &entry.version,
                    entry.content_hash.as_deref(),
                    spec.version.as_deref().unwrap_or(&entry.version),
                    hash,
                )
        });

        let now = self.bus.now();
        let mut modules = self.modules.lock();
        let tracked = modules.entry(name.to_string()).or_insert_with(|| Tracked {
            record: ModuleRecord::new(name, now),
            in_flight: None,
            retry_timer: None,
        });

        if let Some(running) = &tracked.in_flight {
            debug!(module = %name, "Joining in-flight operation");
            return Begin::Running(running.clone());
        }

        let state = tracked.record.state;
        if state == LifecycleState::Unloading {
            return Begin::Ready(LoadOutcome::Rejected {
                reason: format!("module {name} is unloading"),
            });
        }

        let kind = match trigger {
            Trigger::Retry if state != LifecycleState::Error => {
                // The module recovered or was reloaded before the timer fired.
                tracked.retry_timer = None;
                tracked.record.retry_pending = false;
                return Begin::Ready(match cached_handle {
                    Some(handle) => LoadOutcome::Cached(handle),
                    None => LoadOutcome::Rejected {
                        reason: format!("module {name} is {state}"),
                    },
                });
            }
            Trigger::Update if state == LifecycleState::Loaded => OpKind::Update,
            // A fresh record next to a cached handle means an unload
            // finished after the cache read; the handle is stale.
            Trigger::Explicit if satisfied && state != LifecycleState::Unloaded => {
                if let Some(handle) = cached_handle {
                    debug!(module = %name, "Cache hit");
                    return Begin::Ready(LoadOutcome::Cached(handle));
                }
                OpKind::Load
            }
            _ if state == LifecycleState::Loaded => OpKind::Update,
            _ => OpKind::Load,
        };

        match trigger {
            Trigger::Retry => {
                // This timer is the caller; it has already fired.
                tracked.retry_timer = None;
                tracked.record.retry_pending = false;
            }
            Trigger::Explicit | Trigger::Update => {
                if tracked.cancel_retry() {
                    debug!(module = %name, "Pending retry superseded by explicit request");
                }
                if state == LifecycleState::Error
                    && !self.config.retry.should_retry(tracked.record.retry_count)
                {
                    info!(
                        module = %name,
                        failures = tracked.record.retry_count,
                        "Explicit reload after exhausted retries"
                    );
                    tracked.record.retry_count = 0;
                }
            }
        }

        let from = tracked.record.transition(kind.busy_state(), now);
        let previous = match kind {
            OpKind::Update => cached_handle,
            OpKind::Load => None,
        };

        let inner = Arc::clone(self);
        let op_name = name.to_string();
        let task = tokio::spawn(async move { inner.run(op_name, kind, from, previous).await });
        let failed_name = name.to_string();
        let running: SharedOutcome = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(module = %failed_name, error = %e, "Load task did not complete");
                    LoadOutcome::Failed {
                        error: e.to_string(),
                        attempt: 0,
                        retry_in: None,
                    }
                }
            }
        }
        .boxed()
        .shared();

        tracked.in_flight = Some(running.clone());
        Begin::Running(running)
    }

    async fn run(
        self: Arc<Self>,
        name: String,
        kind: OpKind,
        from: LifecycleState,
        previous: Option<ModuleHandle>,
    ) -> LoadOutcome {
        self.emit_state_change(&name, from, kind.busy_state());
        debug!(module = %name, kind = ?kind, "Registry load started");

        let result = AssertUnwindSafe(self.registry.load(&name))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(RegistryError::LoadFailed {
                    name: name.clone(),
                    reason: "registry panicked".to_string(),
                })
            });

        match result {
            Ok(loaded) => self.complete(&name, kind, loaded, previous),
            Err(e) => self.fail(&name, kind, &e),
        }
    }

    fn complete(
        &self,
        name: &str,
        kind: OpKind,
        loaded: LoadedModule,
        previous: Option<ModuleHandle>,
    ) -> LoadOutcome {
        let mut entry = CacheEntry::new(name, loaded.version.clone(), loaded.handle.clone());
        if let Some(hash) = &loaded.content_hash {
            entry = entry.with_hash(hash.clone());
        }
        self.cache.set(name, entry);

        let now = self.bus.now();
        {
            let mut modules = self.modules.lock();
            let tracked = modules.entry(name.to_string()).or_insert_with(|| Tracked {
                record: ModuleRecord::new(name, now),
                in_flight: None,
                retry_timer: None,
            });
            tracked.record.retry_count = 0;
            tracked.record.last_error = None;
            tracked.record.version = Some(loaded.version.clone());
            tracked.record.transition(LifecycleState::Loaded, now);
            tracked.in_flight = None;
        }

        let handle = loaded.handle;
        let source = self.config.event_source.as_str();
        let outcome = match kind {
            OpKind::Load => {
                self.bus.emit(
                    event_types::READY,
                    EventPayload::Lifecycle(LifecyclePayload::Ready {
                        name: name.to_string(),
                        handle: handle.clone(),
                    }),
                    source,
                );
                LoadOutcome::Loaded(handle)
            }
            OpKind::Update => {
                self.bus.emit(
                    event_types::UPDATE,
                    EventPayload::Lifecycle(LifecyclePayload::Update {
                        name: name.to_string(),
                        old_handle: previous.clone(),
                        new_handle: handle.clone(),
                    }),
                    source,
                );
                LoadOutcome::Updated { handle, previous }
            }
        };
        self.emit_state_change(name, kind.busy_state(), LifecycleState::Loaded);

        info!(module = %name, version = %loaded.version, kind = ?kind, "Module loaded");
        outcome
    }

    fn fail(self: &Arc<Self>, name: &str, kind: OpKind, cause: &RegistryError) -> LoadOutcome {
        let error = cause.to_string();
        let now = self.bus.now();

        let (attempt, retry_in) = {
            let mut modules = self.modules.lock();
            let tracked = modules.entry(name.to_string()).or_insert_with(|| Tracked {
                record: ModuleRecord::new(name, now),
                in_flight: None,
                retry_timer: None,
            });
            tracked.record.retry_count += 1;
            tracked.record.last_error = Some(error.clone());
            tracked.record.transition(LifecycleState::Error, now);
            tracked.in_flight = None;

            let attempt = tracked.record.retry_count;
            let retry_in = self.config.retry.should_retry(attempt).then(|| {
                let delay = self.config.retry.delay_for(attempt);
                tracked.retry_timer = Some(self.schedule_retry(name, delay));
                tracked.record.retry_pending = true;
                delay
            });
            (attempt, retry_in)
        };

        // The replaced handle may be partially torn down by the registry.
        if kind == OpKind::Update {
            self.cache.delete(name);
        }

        let source = self.config.event_source.as_str();
        self.emit_state_change(name, kind.busy_state(), LifecycleState::Error);
        self.bus.emit(
            event_types::ERROR,
            EventPayload::Lifecycle(LifecyclePayload::Error {
                name: name.to_string(),
                error: error.clone(),
                attempt,
            }),
            source,
        );

        match retry_in {
            Some(delay) => {
                warn!(
                    module = %name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Module load failed; retry scheduled"
                );
            }
            None => {
                error!(module = %name, attempt, error = %error, "Module recovery failed");
                self.bus.emit(
                    event_types::RECOVERY_FAILED,
                    EventPayload::Lifecycle(LifecyclePayload::RecoveryFailed {
                        name: name.to_string(),
                        attempts: attempt,
                        error: error.clone(),
                    }),
                    source,
                );
            }
        }

        LoadOutcome::Failed {
            error,
            attempt,
            retry_in,
        }
    }

    fn schedule_retry(self: &Arc<Self>, name: &str, delay: Duration) -> AbortHandle {
        let weak: Weak<Self> = Arc::downgrade(self);
        let spec = ModuleSpecifier {
            name: name.to_string(),
            version: None,
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            debug!(module = %spec.name, "Retry timer fired");
            // The load runs in its own task; nothing to wait for here.
            let _ = inner.begin(&spec, None, Trigger::Retry);
        })
        .abort_handle()
    }

    fn unload_step(&self, name: &str) -> UnloadStep {
        let now = self.bus.now();
        let mut modules = self.modules.lock();
        let Some(tracked) = modules.get_mut(name) else {
            return UnloadStep::Done(false);
        };

        if tracked.cancel_retry() {
            debug!(module = %name, "Pending retry cancelled by unload");
        }
        if let Some(running) = &tracked.in_flight {
            return UnloadStep::Wait(running.clone());
        }

        match tracked.record.state {
            LifecycleState::Unloaded => {
                modules.remove(name);
                UnloadStep::Done(true)
            }
            LifecycleState::Unloading => UnloadStep::Done(true),
            _ => UnloadStep::Proceed(tracked.record.transition(LifecycleState::Unloading, now)),
        }
    }

    fn emit_state_change(&self, name: &str, old_state: LifecycleState, new_state: LifecycleState) {
        debug!(module = %name, from = %old_state, to = %new_state, "Lifecycle transition");
        self.bus.emit(
            event_types::STATE_CHANGE,
            EventPayload::Lifecycle(LifecyclePayload::StateChange {
                name: name.to_string(),
                old_state,
                new_state,
            }),
            &self.config.event_source,
        );
    }
}
