//! # MH-02 Shared State
//!
//! Last-writer-wins key/value table shared by loaded modules.
//!
//! **Component ID:** 02
//!
//! ## Rules
//!
//! | Rule | Enforcement |
//! |------|-------------|
//! | Any module may write any key | `set` always succeeds; the writer becomes owner |
//! | Only the owner (or `"system"`) deletes | `delete` returns `false` otherwise |
//! | Subscribers never poll | `shared-state:change` / `shared-state:remove` events |
//! | Stale data does not accumulate | Hourly sweep of non-persistent entries older than 7 days |
//! | Flagged keys survive restarts | `persist` / `restore` of the `persistent` subset |
//!
//! Concurrent writers to one key race; the last write wins and no conflict
//! resolution is attempted.

#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod application;
pub mod config;
pub mod domain;

pub use application::{spawn_sweep_task, SharedStateStore};
pub use config::SharedStateConfig;
pub use domain::{can_delete, SharedStateEntry, StateError};
