//! # Owner Cleanup
//!
//! Non-persistent shared-state entries written by a module are removed once
//! that module reaches `unloaded`; persistent ones stay for the next
//! `persist()`. The watcher consumes a bus stream from its own task rather
//! than a synchronous handler, so the unloading caller never runs cleanup
//! inline.

use mh_02_shared_state::SharedStateStore;
use shared_bus::{event_types, EventBus, EventFilter, LifecyclePayload};
use shared_types::LifecycleState;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub fn spawn_owner_cleanup(
    bus: &EventBus,
    state: Arc<SharedStateStore>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut events = bus.stream(EventFilter::types([event_types::STATE_CHANGE]));
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    if let Some(LifecyclePayload::StateChange {
                        name,
                        new_state: LifecycleState::Unloaded,
                        ..
                    }) = event.payload.as_lifecycle()
                    {
                        let removed = state.clear_owner(name);
                        if removed > 0 {
                            info!(module = %name, removed, "Cleared shared state of unloaded module");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    debug!(lagged = events.lagged(), "Owner cleanup stopped");
                    break;
                }
            }
        }
    })
}
