//! # Container
//!
//! Configuration and the context object holding every component.

pub mod config;
pub mod context;

pub use config::{ConfigError, HostConfig, CONFIG_PATH_VAR, STORE_FILE};
pub use context::{ModuleHostBuilder, ModuleHostContext, ShutdownReport, StartReport};
