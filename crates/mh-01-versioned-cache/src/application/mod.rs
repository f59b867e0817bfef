//! # Application Layer

pub mod cleanup;
pub mod service;

pub use cleanup::spawn_cleanup_task;
pub use service::VersionedCache;
