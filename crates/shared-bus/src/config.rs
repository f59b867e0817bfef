//! # Bus Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Event bus configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Events retained for replay and `history()` (oldest dropped first).
    pub history_size: usize,

    /// How far back replay looks when a module registers, in milliseconds.
    pub replay_window_ms: u64,

    /// How long discovery collects responses, in milliseconds.
    pub discovery_window_ms: u64,

    /// Per-receiver queue length for `stream()` subscribers.
    pub stream_capacity: usize,

    /// Handlers slower than this are logged, in milliseconds.
    pub slow_handler_warn_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_size: crate::DEFAULT_HISTORY_SIZE,
            replay_window_ms: 60_000,
            discovery_window_ms: 1_000,
            stream_capacity: crate::DEFAULT_CHANNEL_CAPACITY,
            slow_handler_warn_ms: 100,
        }
    }
}

impl BusConfig {
    /// Create a config for testing (short windows).
    pub fn for_testing() -> Self {
        Self {
            history_size: 50,
            replay_window_ms: 60_000,
            discovery_window_ms: 50,
            stream_capacity: 64,
            slow_handler_warn_ms: 1_000,
        }
    }

    pub fn replay_window(&self) -> Duration {
        Duration::from_millis(self.replay_window_ms)
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.discovery_window_ms)
    }

    pub fn slow_handler_warn(&self) -> Duration {
        Duration::from_millis(self.slow_handler_warn_ms)
    }
}
