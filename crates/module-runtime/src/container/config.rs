//! # Host Configuration
//!
//! One struct aggregating every component config. Loaded from an optional
//! JSON file named by `MH_CONFIG`, then overridden by `MH_*` variables.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `MH_DATA_DIR` | `data_dir` |
//! | `MH_CACHE_MAX_SIZE` | `cache.max_size` |
//! | `MH_CACHE_TTL_SECS` | `cache.default_ttl_secs` |
//! | `MH_MAX_RETRIES` | `lifecycle.retry.max_retries` |
//! | `MH_DISCOVERY_WINDOW_MS` | `bus.discovery_window_ms` |
//! | `MH_LOG_LEVEL` | `telemetry.log_level` |
//! | `MH_JSON_LOGS` | `telemetry.json_logs` |

use mh_01_versioned_cache::CacheConfig;
use mh_02_shared_state::SharedStateConfig;
use mh_03_lifecycle::LifecycleConfig;
use module_telemetry::{parse_flag, TelemetryConfig};
use serde::{Deserialize, Serialize};
use shared_bus::BusConfig;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the JSON config file.
pub const CONFIG_PATH_VAR: &str = "MH_CONFIG";

/// File inside `data_dir` backing the durable store.
pub const STORE_FILE: &str = "module-host.json";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value {value:?} for {var}")]
    InvalidValue { var: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directory holding the durable store file.
    pub data_dir: PathBuf,
    pub cache: CacheConfig,
    pub bus: BusConfig,
    pub shared_state: SharedStateConfig,
    pub lifecycle: LifecycleConfig,
    pub telemetry: TelemetryConfig,
    /// Restore cache and shared state when the host starts.
    pub restore_on_start: bool,
    /// Periodic persistence interval in seconds (0 disables).
    pub persist_interval_secs: u64,
    /// How often component statistics are sampled into metrics, in seconds.
    pub metrics_interval_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            cache: CacheConfig::default(),
            bus: BusConfig::default(),
            shared_state: SharedStateConfig::default(),
            lifecycle: LifecycleConfig::default(),
            telemetry: TelemetryConfig::default(),
            restore_on_start: true,
            persist_interval_secs: 60,
            metrics_interval_secs: 15,
        }
    }
}

impl HostConfig {
    /// Small windows and delays for tests, storing under `data_dir`.
    pub fn for_testing(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache: CacheConfig::for_testing(),
            bus: BusConfig::for_testing(),
            shared_state: SharedStateConfig::for_testing(),
            lifecycle: LifecycleConfig::for_testing(),
            telemetry: TelemetryConfig::default(),
            restore_on_start: true,
            persist_interval_secs: 0,
            metrics_interval_secs: 1,
        }
    }

    /// Load from `MH_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `MH_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("MH_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = parse_var(&lookup, "MH_CACHE_MAX_SIZE")? {
            self.cache.max_size = v;
        }
        if let Some(v) = parse_var(&lookup, "MH_CACHE_TTL_SECS")? {
            self.cache.default_ttl_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "MH_MAX_RETRIES")? {
            self.lifecycle.retry.max_retries = v;
        }
        if let Some(v) = parse_var(&lookup, "MH_DISCOVERY_WINDOW_MS")? {
            self.bus.discovery_window_ms = v;
        }
        if let Some(level) = lookup("MH_LOG_LEVEL") {
            self.telemetry.log_level = level;
        }
        if let Some(flag) = lookup("MH_JSON_LOGS") {
            self.telemetry.json_logs = parse_flag(&flag, self.telemetry.json_logs);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_size == 0 {
            return Err(ConfigError::Invalid("cache.max_size must be > 0".into()));
        }
        if self.bus.history_size == 0 {
            return Err(ConfigError::Invalid("bus.history_size must be > 0".into()));
        }
        if self.bus.stream_capacity == 0 {
            return Err(ConfigError::Invalid("bus.stream_capacity must be > 0".into()));
        }
        if !(self.lifecycle.retry.factor >= 1.0) {
            return Err(ConfigError::Invalid(
                "lifecycle.retry.factor must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Path of the durable store file.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE)
    }

    pub fn persist_interval(&self) -> Option<Duration> {
        (self.persist_interval_secs > 0).then(|| Duration::from_secs(self.persist_interval_secs))
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs.max(1))
    }
}

fn parse_var<F, T>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = HostConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.max_size, 100);
        assert_eq!(config.lifecycle.retry.max_retries, 3);
        assert_eq!(config.persist_interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HostConfig::default();
        config
            .apply_overrides(env(&[
                ("MH_DATA_DIR", "/tmp/mh"),
                ("MH_CACHE_MAX_SIZE", "7"),
                ("MH_CACHE_TTL_SECS", "0"),
                ("MH_MAX_RETRIES", "5"),
                ("MH_DISCOVERY_WINDOW_MS", "250"),
                ("MH_LOG_LEVEL", "debug"),
                ("MH_JSON_LOGS", "true"),
            ]))
            .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/mh"));
        assert_eq!(config.cache.max_size, 7);
        assert_eq!(config.cache.default_ttl(), None);
        assert_eq!(config.lifecycle.retry.max_retries, 5);
        assert_eq!(config.bus.discovery_window_ms, 250);
        assert_eq!(config.telemetry.log_level, "debug");
        assert!(config.telemetry.json_logs);
    }

    #[test]
    fn test_bad_number_rejected() {
        let mut config = HostConfig::default();
        let err = config
            .apply_overrides(env(&[("MH_CACHE_MAX_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "MH_CACHE_MAX_SIZE"));
    }

    #[test]
    fn test_zero_cache_size_invalid() {
        let mut config = HostConfig::default();
        config.cache.max_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.json");
        std::fs::write(
            &path,
            r#"{"cache": {"max_size": 12}, "lifecycle": {"retry": {"max_retries": 1}}}"#,
        )
        .unwrap();

        let config = HostConfig::from_file(&path).unwrap();
        assert_eq!(config.cache.max_size, 12);
        assert_eq!(config.cache.namespace, "module-cache");
        assert_eq!(config.lifecycle.retry.max_retries, 1);
        assert_eq!(config.lifecycle.retry.base_delay_ms, 1_000);
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            HostConfig::from_file(dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            HostConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
