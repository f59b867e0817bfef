//! # Retry Policy
//!
//! Failed loads are retried after an exponentially growing delay until
//! `max_retries` consecutive failures, after which recovery is reported as
//! failed and the module stays in `error` until explicitly reloaded.
//!
//! ```text
//! attempt n fails ──→ n < max_retries ? ──yes──→ wait base × factor^(n-1) (≤ cap) ──→ retry
//!                                      └─no───→ module:recovery-failed
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Consecutive failures before giving up.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Cap applied to every delay.
    pub max_delay_ms: u64,
    /// Growth factor per attempt.
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Short delays for tests.
    pub fn for_testing() -> Self {
        Self {
            base_delay_ms: 10,
            max_delay_ms: 40,
            ..Self::default()
        }
    }

    /// Whether another attempt follows `failures` consecutive failures.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_retries
    }

    /// Delay before retrying after the `failures`-th failure (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = i32::try_from(failures.saturating_sub(1)).unwrap_or(i32::MAX);
        let max_ms = self.max_delay_ms as f64;
        let unclamped = self.base_delay_ms as f64 * self.factor.powi(exponent);

        if !unclamped.is_finite() || unclamped < 0.0 || unclamped > max_ms {
            Duration::from_millis(self.max_delay_ms)
        } else {
            Duration::from_millis(unclamped as u64)
        }
    }
}
