//! # Domain Layer
//!
//! Module records, load outcomes, retry policy and errors.

pub mod errors;
pub mod outcome;
pub mod record;
pub mod retry;

pub use errors::{LifecycleError, RegistryError};
pub use outcome::LoadOutcome;
pub use record::ModuleRecord;
pub use retry::RetryPolicy;
