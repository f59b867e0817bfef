//! # Module Record
//!
//! Tracking entry for one module. Created on first reference, mutated only
//! by the coordinator, removed on explicit unload. Its `state` is what UI
//! collaborators render.

use serde::Serialize;
use shared_types::{LifecycleState, ModuleName, Timestamp};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRecord {
    pub name: ModuleName,
    pub state: LifecycleState,
    /// Consecutive failed attempts of the current load.
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Version of the loaded module, once loaded.
    pub version: Option<String>,
    /// A retry timer is armed.
    pub retry_pending: bool,
    /// Last state change (milliseconds).
    pub updated_at: Timestamp,
}

impl ModuleRecord {
    pub fn new(name: impl Into<String>, now: Timestamp) -> Self {
        Self {
            name: name.into(),
            state: LifecycleState::Unloaded,
            retry_count: 0,
            last_error: None,
            version: None,
            retry_pending: false,
            updated_at: now,
        }
    }

    /// Move to `next`, returning the previous state.
    ///
    /// The coordinator only requests legal transitions; an illegal one is
    /// logged and still applied so the record never disagrees with the
    /// events already emitted.
    pub fn transition(&mut self, next: LifecycleState, now: Timestamp) -> LifecycleState {
        let previous = self.state;
        if !previous.can_transition_to(next) {
            warn!(
                module = %self.name,
                from = %previous,
                to = %next,
                "Illegal lifecycle transition"
            );
        }
        self.state = next;
        self.updated_at = now;
        previous
    }
}
