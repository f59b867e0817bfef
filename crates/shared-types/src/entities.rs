//! # Core Domain Entities
//!
//! Defines the vocabulary every module-host crate speaks.
//!
//! ## Clusters
//!
//! - **Identity**: `ModuleName`, `ModuleSpecifier`, `SYSTEM_OWNER`
//! - **Lifecycle**: `LifecycleState` and its transition table
//! - **Handles**: `ModuleHandle`, the opaque loaded representation of a module

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// Name of an independently loadable module (e.g. `"charts"`).
pub type ModuleName = String;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Owner identity allowed to delete any shared-state entry.
pub const SYSTEM_OWNER: &str = "system";

/// A parsed `name@version` load request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpecifier {
    /// Module name.
    pub name: ModuleName,
    /// Requested semantic version, if any.
    pub version: Option<String>,
}

impl ModuleSpecifier {
    /// Create a specifier for a module with an explicit version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }

    /// Parse `"charts@1.0.0"` or a bare `"charts"`.
    ///
    /// Scoped names such as `"@org/charts@2.1.0"` keep their leading `@`.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let split_at = input
            .char_indices()
            .skip(1)
            .filter(|(_, c)| *c == '@')
            .map(|(i, _)| i)
            .last();

        match split_at {
            Some(idx) if idx + 1 < input.len() => Self {
                name: input[..idx].to_string(),
                version: Some(input[idx + 1..].to_string()),
            },
            Some(idx) => Self {
                name: input[..idx].to_string(),
                version: None,
            },
            None => Self {
                name: input.to_string(),
                version: None,
            },
        }
    }
}

impl fmt::Display for ModuleSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

// =============================================================================
// CLUSTER B: LIFECYCLE
// =============================================================================

/// Lifecycle state of a module.
///
/// ```text
/// [UNLOADED] ──load──→ [LOADING] ──ok──→ [LOADED] ──unload──→ [UNLOADING] ──→ [UNLOADED]
///                          │                 │  ↑
///                          └──fail──→ [ERROR]│  └──ok── [UPDATING]
///                                       ↑  │ └──hot swap──→ ┘  │
///                                       │  └──retry──→ [LOADING]│
///                                       └──────── fail ─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Not loaded. Initial state and reachable terminal state.
    #[default]
    Unloaded,
    /// A registry load is in flight.
    Loading,
    /// Loaded and retrievable from the cache.
    Loaded,
    /// The last load or update failed.
    Error,
    /// A hot swap of a loaded module is in flight.
    Updating,
    /// Resources are being released.
    Unloading,
}

impl LifecycleState {
    /// Every state, in declaration order.
    pub const ALL: [LifecycleState; 6] = [
        LifecycleState::Unloaded,
        LifecycleState::Loading,
        LifecycleState::Loaded,
        LifecycleState::Error,
        LifecycleState::Updating,
        LifecycleState::Unloading,
    ];

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Error => "error",
            Self::Updating => "updating",
            Self::Unloading => "unloading",
        }
    }

    /// Whether `self → next` is a legal transition.
    ///
    /// Unloading is reachable from `error` as well so a failed module can be
    /// released without another load attempt.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Unloaded, Loading)
                | (Loading, Loaded)
                | (Loading, Error)
                | (Loaded, Unloading)
                | (Loaded, Updating)
                | (Updating, Loaded)
                | (Updating, Error)
                | (Error, Loading)
                | (Error, Unloading)
                | (Unloading, Unloaded)
        )
    }

    /// True while a registry operation is outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Loading | Self::Updating | Self::Unloading)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CLUSTER C: HANDLES
// =============================================================================

/// Opaque, shareable handle to a loaded module.
///
/// Multiple readers may hold the same handle concurrently; any mutable state
/// inside the wrapped value is the registry's concern.
#[derive(Clone)]
pub struct ModuleHandle {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ModuleHandle {
    /// Wrap a loaded module value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the wrapped value if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Get a shared pointer to the wrapped value if it is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    /// True if both handles point at the same loaded instance.
    pub fn ptr_eq(&self, other: &ModuleHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Rust type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Number of live clones of this handle.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl PartialEq for ModuleHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("type", &self.type_name)
            .field("holders", &self.holders())
            .finish()
    }
}
