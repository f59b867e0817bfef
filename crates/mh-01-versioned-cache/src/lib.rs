//! # MH-01 Versioned Cache
//!
//! Bounded, TTL-aware store of loaded modules with a semantic version gate.
//!
//! **Component ID:** 01
//! **Architecture:** Domain / Application layers over the shared
//! `DurableStore` and `TimeSource` ports
//!
//! ## Guarantees
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | Expired entries are never returned | TTL check on every read, periodic sweep |
//! | Bounded memory | LRU eviction at `max_size` |
//! | Handles released | Dispose hook runs exactly once per dropped entry |
//! | No redundant reloads | `needs_update` version/hash gate |
//! | Cold start survives bad storage | Corrupted or incompatible payloads are discarded whole |
//!
//! ## Module Structure
//!
//! ```text
//! mh-01-versioned-cache/
//! ├── domain/        # CacheEntry, version gate, persisted records, errors
//! ├── application/   # VersionedCache service + cleanup task
//! └── config.rs      # CacheConfig
//! ```

#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod application;
pub mod config;
pub mod domain;

pub use application::{spawn_cleanup_task, VersionedCache};
pub use config::{CacheConfig, CACHE_SCHEMA_VERSION};
pub use domain::{
    needs_update, CacheEntry, CacheError, CacheMeta, CachePayload, CacheStats, DisposeHook,
    EntryStats, PersistedEntry, SemVer,
};
