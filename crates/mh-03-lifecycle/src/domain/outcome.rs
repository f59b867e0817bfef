//! # Load Outcome
//!
//! What a `load`/`update` call resolves to. Every caller joined to the same
//! in-flight operation receives a clone of the same outcome.

use shared_types::ModuleHandle;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// Served from the cache without a registry call.
    Cached(ModuleHandle),
    /// Freshly loaded by the registry.
    Loaded(ModuleHandle),
    /// Hot-swapped; `previous` is the handle that was replaced, if it was
    /// still cached.
    Updated {
        handle: ModuleHandle,
        previous: Option<ModuleHandle>,
    },
    /// The attempt failed. `retry_in` is set when a retry was scheduled;
    /// `None` means retries are exhausted.
    Failed {
        error: String,
        attempt: u32,
        retry_in: Option<Duration>,
    },
    /// Not attempted (module unloading, or an unusable name).
    Rejected { reason: String },
}

impl LoadOutcome {
    /// The usable handle, if the module is available.
    pub fn handle(&self) -> Option<&ModuleHandle> {
        match self {
            Self::Cached(handle) | Self::Loaded(handle) | Self::Updated { handle, .. } => {
                Some(handle)
            }
            Self::Failed { .. } | Self::Rejected { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.handle().is_some()
    }

    /// True when the module ended in `error` with no retry scheduled.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Failed { retry_in: None, .. })
    }
}
