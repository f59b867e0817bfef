//! # Wiring
//!
//! Cross-component behavior that no single component owns: clearing shared
//! state of unloaded modules, exporting metrics, periodic persistence.

pub mod metrics;
pub mod ownership;
pub mod persistence;

pub use metrics::{spawn_metrics_sampler, subscribe_metrics, MetricsSources};
pub use ownership::spawn_owner_cleanup;
pub use persistence::spawn_persist_task;
