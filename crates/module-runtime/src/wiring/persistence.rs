//! # Periodic Persistence

use mh_01_versioned_cache::VersionedCache;
use mh_02_shared_state::SharedStateStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Persist the cache and the persistent shared-state keys every `period`.
pub fn spawn_persist_task(
    cache: Arc<VersionedCache>,
    state: Arc<SharedStateStore>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cache_ok = cache.persist();
                    let state_ok = state.persist();
                    debug!(cache_ok, state_ok, "Periodic persist");
                }
                _ = shutdown.changed() => {
                    info!("Persist task stopped");
                    break;
                }
            }
        }
    })
}
