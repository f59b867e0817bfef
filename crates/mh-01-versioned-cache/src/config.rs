//! # Cache Configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Schema tag written next to persisted entries. A different major version
/// discards the whole persisted set on restore.
pub const CACHE_SCHEMA_VERSION: &str = "1.0.0";

/// Versioned cache configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries before least-recently-used eviction.
    pub max_size: usize,

    /// TTL applied to entries stored without one. `0` disables expiry.
    pub default_ttl_secs: u64,

    /// Interval of the background expiry sweep.
    pub cleanup_interval_secs: u64,

    /// Durable storage key prefix.
    pub namespace: String,

    /// Schema tag of the running build.
    pub schema_version: String,

    /// Minimum acceptable version per module. Persisted entries older than
    /// their baseline are not restored.
    pub baseline_versions: BTreeMap<String, String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            default_ttl_secs: 60 * 60,
            cleanup_interval_secs: 5 * 60,
            namespace: "module-cache".to_string(),
            schema_version: CACHE_SCHEMA_VERSION.to_string(),
            baseline_versions: BTreeMap::new(),
        }
    }
}

impl CacheConfig {
    /// Create a config for testing (smaller values).
    pub fn for_testing() -> Self {
        Self {
            max_size: 8,
            default_ttl_secs: 60,
            cleanup_interval_secs: 1,
            ..Self::default()
        }
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl_secs > 0).then(|| Duration::from_secs(self.default_ttl_secs))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    pub fn entries_key(&self) -> String {
        format!("{}:entries", self.namespace)
    }

    pub fn meta_key(&self) -> String {
        format!("{}:meta", self.namespace)
    }
}
