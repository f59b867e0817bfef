//! # Application Layer

pub mod service;
pub mod sweep;

pub use service::SharedStateStore;
pub use sweep::spawn_sweep_task;
