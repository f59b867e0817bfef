//! # Periodic Sweep

use super::service::SharedStateStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Run `state.sweep()` every `sweep_interval` until `shutdown` changes.
pub fn spawn_sweep_task(
    state: Arc<SharedStateStore>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let period = state.config().sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    state.sweep();
                }
                _ = shutdown.changed() => {
                    info!("Shared state sweep task stopped");
                    break;
                }
            }
        }
    })
}
