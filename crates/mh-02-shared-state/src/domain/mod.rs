//! # Domain Layer

pub mod entry;
pub mod errors;

pub use entry::{can_delete, SharedStateEntry};
pub use errors::StateError;
