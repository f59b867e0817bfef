//! # Module Runtime Library
//!
//! Host-side assembly of the module substrate. The `module-host` binary in
//! `main.rs` is a thin shell over this library.
//!
//! ## Modular Structure
//!
//! - `container/` - `HostConfig` loading and the `ModuleHostContext`
//! - `wiring/` - owner cleanup, metrics export, periodic persistence
//! - `demo` - sample modules for the binary
//!
//! ## Component Graph
//!
//! ```text
//!                    ┌──────────────────────┐
//!   load/unload ───→ │ LifecycleCoordinator │ ──→ ModuleRegistry
//!                    └──────────┬───────────┘
//!                        set/get│      │emit
//!                               ↓      ↓
//!                 VersionedCache     EventBus ←── SharedStateStore
//!                        │              │               │
//!                        └──── DurableStore ────────────┘
//! ```

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod container;
pub mod demo;
pub mod wiring;

pub use container::{
    ConfigError, HostConfig, ModuleHostBuilder, ModuleHostContext, ShutdownReport, StartReport,
};
