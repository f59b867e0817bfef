//! # Shared Bus - Event Bus for Inter-Module Communication
//!
//! Loaded modules never call each other directly. They observe the world
//! through events emitted here and through the shared-state store, which
//! itself announces every change on this bus.
//!
//! ## Channels
//!
//! ```text
//! emit("ping", ..)               ──→ handlers of "ping"
//! emit_to("ping", .., "charts")  ──→ handlers of "ping"
//!                                ──→ handlers of "ping:charts"
//! register_module("charts")      ──→ handlers of "replay:<type>:charts"
//!                                    for recent module:* / shared-state:*
//!                                    events
//! ```
//!
//! ## Guarantees
//!
//! - `emit` never fails and never propagates a handler error or panic.
//! - Each handler sees events in emission order, the order of `history()`.
//! - `emit` never waits on handlers running on another thread.
//! - History is bounded; overflow drops the oldest event.
//! - `stream()` receivers are bounded; a slow receiver loses its oldest
//!   events rather than blocking the emitter.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod discovery;
pub mod events;
mod history;
pub mod publisher;
pub mod subscriber;

pub use config::BusConfig;
pub use events::{
    event_types, is_replayable, DiscoveryPayload, Event, EventFilter, EventPayload,
    LifecyclePayload, ModuleDiscovery, SharedStatePayload,
};
pub use publisher::{BusStats, EventBus};
pub use subscriber::{
    EventReceiver, EventStream, HandlerError, HandlerResult, Subscription, SubscriptionError,
};

/// Events retained for replay by default.
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

/// Maximum events to buffer per stream receiver before dropping the oldest.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
