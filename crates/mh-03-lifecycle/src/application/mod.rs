//! # Application Layer

pub mod coordinator;

pub use coordinator::LifecycleCoordinator;
