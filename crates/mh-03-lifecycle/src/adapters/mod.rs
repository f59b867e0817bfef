//! # Adapters Layer
//!
//! Registry implementations.
//!
//! Production (in-process): `StaticModuleRegistry`
//! Testing: `MockModuleRegistry`

pub mod mock;
pub mod static_registry;

pub use mock::{MockModule, MockModuleRegistry};
pub use static_registry::{ModuleFactory, StaticModuleRegistry};
