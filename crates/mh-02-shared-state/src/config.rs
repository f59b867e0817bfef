//! # Shared State Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shared state store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedStateConfig {
    /// Interval of the stale-entry sweep.
    pub sweep_interval_secs: u64,

    /// Non-persistent entries older than this are swept.
    pub max_age_secs: u64,

    /// Durable storage key prefix.
    pub namespace: String,
}

impl Default for SharedStateConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60 * 60,
            max_age_secs: 7 * 24 * 60 * 60,
            namespace: "shared-state".to_string(),
        }
    }
}

impl SharedStateConfig {
    /// Create a config for testing (short sweep interval).
    pub fn for_testing() -> Self {
        Self {
            sweep_interval_secs: 1,
            ..Self::default()
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn persistent_key(&self) -> String {
        format!("{}:persistent", self.namespace)
    }
}
