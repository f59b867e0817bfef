//! # Periodic Cleanup
//!
//! Background sweep of expired entries, independent of the lazy expiry done
//! on access.

use super::service::VersionedCache;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Run `cache.cleanup()` every `cleanup_interval` until `shutdown` changes.
pub fn spawn_cleanup_task(
    cache: Arc<VersionedCache>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let period = cache.config().cleanup_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        info!(interval_secs = period.as_secs(), "Cache cleanup task started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = cache.cleanup();
                    debug!(removed, "Cache cleanup tick");
                }
                _ = shutdown.changed() => {
                    info!("Cache cleanup task stopped");
                    break;
                }
            }
        }
    })
}
