//! # Module Telemetry
//!
//! Logging and metrics shared by the module host crates.
//!
//! - **Logs**: `tracing-subscriber` with an `EnvFilter`, pretty or JSON
//! - **Metrics**: Prometheus counters and gauges in a crate-level registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use module_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_telemetry(&TelemetryConfig::from_env())?;
//!     // ...
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MH_LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` wins if set) |
//! | `MH_JSON_LOGS` | `false` | JSON log lines |
//! | `MH_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `MH_SERVICE_NAME` | `module-host` | Service name in logs |

mod config;
mod logging;
pub mod metrics;

pub use config::{parse_flag, TelemetryConfig};
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, sync_counter, CACHE_EVICTIONS, CACHE_EXPIRATIONS,
    CACHE_HITS, CACHE_MISSES, CACHE_SIZE, EVENTS_EMITTED, HANDLER_FAILURES, MODULES_LOADED,
    MODULE_LOADS, MODULE_RECOVERY_FAILURES, SHARED_STATE_KEYS, SHARED_STATE_WRITES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics, then install the global log subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_logging(config)
}
