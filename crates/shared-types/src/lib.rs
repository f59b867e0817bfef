//! # Shared Types Crate
//!
//! This crate contains the entities and ports every module-host crate
//! agrees on.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: lifecycle states, handles and module names
//!   are defined once here.
//! - **Ports, not singletons**: clocks and durable storage are traits handed
//!   to components at construction time, never reached through globals.

pub mod entities;
pub mod errors;
pub mod storage;
pub mod time;

pub use entities::*;
pub use errors::*;
pub use storage::{DurableStore, FileDurableStore, InMemoryDurableStore};
pub use time::{duration_millis, now_millis, ManualTimeSource, SystemTimeSource, TimeSource};
