//! # Lifecycle Configuration

use crate::domain::RetryPolicy;
use serde::{Deserialize, Serialize};
use shared_types::SYSTEM_OWNER;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Backoff applied to failed loads.
    pub retry: RetryPolicy,

    /// `source` of every lifecycle event.
    pub event_source: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            event_source: SYSTEM_OWNER.to_string(),
        }
    }
}

impl LifecycleConfig {
    /// Create a config for testing (millisecond backoff).
    pub fn for_testing() -> Self {
        Self {
            retry: RetryPolicy::for_testing(),
            ..Self::default()
        }
    }
}
