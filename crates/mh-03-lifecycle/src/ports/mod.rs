//! # Ports Layer

pub mod outbound;

pub use outbound::{LoadedModule, ModuleRegistry, RegisteredModule};
