//! # Lifecycle Coordinator Subsystem
//!
//! Owns the state machine of every module: loads through the registry,
//! writes the versioned cache, announces transitions on the bus, and
//! retries failed loads with exponential backoff.
//!
//! | Operation | Outcome |
//! |-----------|---------|
//! | `load("charts@1.0.0")` | `Cached`, `Loaded`, `Updated`, `Failed` or `Rejected` |
//! | `update("charts")` | forced hot swap of a loaded module |
//! | `unload("charts")` | cancels retries, drops cache entry, releases registry |
//! | `register(name, locator)` | tells the registry where a module lives |
//!
//! ## Module Structure
//!
//! ```text
//! mh-03-lifecycle/
//! ├── domain/        # ModuleRecord, LoadOutcome, RetryPolicy, errors
//! ├── ports/         # ModuleRegistry (outbound)
//! ├── adapters/      # StaticModuleRegistry, MockModuleRegistry
//! ├── application/   # LifecycleCoordinator
//! └── config.rs      # LifecycleConfig
//! ```
//!
//! ## Events
//!
//! All lifecycle events carry `source = config.event_source`:
//!
//! - `module:state-change` on every transition
//! - `module:ready` after a cold load, before the `loaded` state change
//! - `module:update` after a hot swap, before the `loaded` state change
//! - `module:error` on every failed attempt
//! - `module:recovery-failed` once retries are exhausted

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use adapters::{MockModule, MockModuleRegistry, ModuleFactory, StaticModuleRegistry};
pub use application::LifecycleCoordinator;
pub use config::LifecycleConfig;
pub use domain::{LifecycleError, LoadOutcome, ModuleRecord, RegistryError, RetryPolicy};
pub use ports::{LoadedModule, ModuleRegistry, RegisteredModule};
