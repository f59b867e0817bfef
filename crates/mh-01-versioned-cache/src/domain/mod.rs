//! # Domain Layer
//!
//! Cache entries, the semantic version gate, persisted record shapes and
//! errors. Nothing here touches locks or storage.

pub mod entry;
pub mod errors;
pub mod persistence;
pub mod stats;
pub mod version;

pub use entry::{CacheEntry, DisposeHook};
pub use errors::CacheError;
pub use persistence::{CacheMeta, CachePayload, PersistedEntry};
pub use stats::{CacheStats, EntryStats};
pub use version::{needs_update, same_major, SemVer};
