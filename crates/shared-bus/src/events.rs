//! # Module Events
//!
//! Defines the event envelope and the payload shapes that flow through the
//! bus. Reserved event types carry typed payloads; module-to-module traffic
//! uses [`EventPayload::Custom`].

use serde::{Deserialize, Serialize};
use shared_types::{LifecycleState, ModuleHandle, ModuleName, Timestamp};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Reserved event type names.
pub mod event_types {
    /// `{name, old_state, new_state}`. Part of the UI contract.
    pub const STATE_CHANGE: &str = "module:state-change";
    /// `{name, handle}`. Part of the UI contract.
    pub const READY: &str = "module:ready";
    /// `{name, error}`. Part of the UI contract.
    pub const ERROR: &str = "module:error";
    /// `{name, old_handle, new_handle}`. Part of the UI contract.
    pub const UPDATE: &str = "module:update";
    /// Retries exhausted for one load attempt.
    pub const RECOVERY_FAILED: &str = "module:recovery-failed";

    /// A shared-state key was written.
    pub const SHARED_STATE_CHANGE: &str = "shared-state:change";
    /// A shared-state key was removed.
    pub const SHARED_STATE_REMOVE: &str = "shared-state:remove";

    /// Scatter phase of module discovery.
    pub const DISCOVERY_REQUEST: &str = "discovery:request";
    /// A module answering a discovery request.
    pub const DISCOVERY_RESPONSE: &str = "discovery:response";
    /// Gather phase finished.
    pub const DISCOVERY_COMPLETE: &str = "discovery:complete";

    /// Prefix of channels carrying replayed history.
    pub const REPLAY_PREFIX: &str = "replay:";
}

/// Event type prefixes eligible for replay to late registrants.
pub const REPLAYABLE_PREFIXES: [&str; 2] = ["module:", "shared-state:"];

/// Whether events of this type are replayed to newly registered modules.
pub fn is_replayable(event_type: &str) -> bool {
    REPLAYABLE_PREFIXES
        .iter()
        .any(|prefix| event_type.starts_with(prefix))
}

/// Name of the target-qualified channel for `event_type`.
pub fn targeted_channel(event_type: &str, target: &str) -> String {
    format!("{event_type}:{target}")
}

/// Name of the replay channel for `event_type`.
pub fn replay_channel(event_type: &str) -> String {
    format!("{}{}", event_types::REPLAY_PREFIX, event_type)
}

/// An emitted event. Immutable once emitted: handlers only ever see `&Event`
/// and history hands out clones.
#[derive(Debug, Clone)]
pub struct Event {
    /// Unique id.
    pub id: Uuid,
    /// Event type (channel name without target qualification).
    pub event_type: String,
    /// Emitting module.
    pub source: ModuleName,
    /// Addressee; `None` means broadcast.
    pub target: Option<ModuleName>,
    /// Payload.
    pub payload: EventPayload,
    /// Emission time in milliseconds.
    pub timestamp: Timestamp,
}

impl Event {
    pub(crate) fn new(
        event_type: &str,
        payload: EventPayload,
        source: &str,
        target: Option<&str>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            source: source.to_string(),
            target: target.map(str::to_string),
            payload,
            timestamp,
        }
    }

    /// True when the event was not addressed to a single module.
    pub fn is_broadcast(&self) -> bool {
        self.target.is_none()
    }
}

/// Payload carried by an [`Event`].
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// Reserved `module:*` lifecycle payloads.
    Lifecycle(LifecyclePayload),
    /// Reserved `shared-state:*` payloads.
    SharedState(SharedStatePayload),
    /// Reserved `discovery:*` payloads.
    Discovery(DiscoveryPayload),
    /// Opaque module-to-module payload.
    Custom(serde_json::Value),
    /// No payload.
    Empty,
}

impl EventPayload {
    /// Convenience constructor for custom JSON payloads.
    pub fn custom(value: impl Into<serde_json::Value>) -> Self {
        Self::Custom(value.into())
    }

    /// Borrow the lifecycle payload, if any.
    pub fn as_lifecycle(&self) -> Option<&LifecyclePayload> {
        match self {
            Self::Lifecycle(p) => Some(p),
            _ => None,
        }
    }

    /// Borrow the shared-state payload, if any.
    pub fn as_shared_state(&self) -> Option<&SharedStatePayload> {
        match self {
            Self::SharedState(p) => Some(p),
            _ => None,
        }
    }

    /// Borrow the custom JSON payload, if any.
    pub fn as_custom(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Custom(v) => Some(v),
            _ => None,
        }
    }
}

/// Lifecycle payloads emitted by the coordinator.
#[derive(Debug, Clone)]
pub enum LifecyclePayload {
    /// `module:state-change`
    StateChange {
        name: ModuleName,
        old_state: LifecycleState,
        new_state: LifecycleState,
    },
    /// `module:ready`
    Ready {
        name: ModuleName,
        handle: ModuleHandle,
    },
    /// `module:error`
    Error {
        name: ModuleName,
        error: String,
        /// Failed attempts so far for the current load.
        attempt: u32,
    },
    /// `module:update`
    Update {
        name: ModuleName,
        old_handle: Option<ModuleHandle>,
        new_handle: ModuleHandle,
    },
    /// `module:recovery-failed`
    RecoveryFailed {
        name: ModuleName,
        attempts: u32,
        error: String,
    },
}

impl LifecyclePayload {
    /// Module the payload refers to.
    pub fn module_name(&self) -> &str {
        match self {
            Self::StateChange { name, .. }
            | Self::Ready { name, .. }
            | Self::Error { name, .. }
            | Self::Update { name, .. }
            | Self::RecoveryFailed { name, .. } => name,
        }
    }
}

/// Shared-state change notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum SharedStatePayload {
    /// `shared-state:change`
    Change {
        key: String,
        value: serde_json::Value,
        owner: ModuleName,
        previous: Option<serde_json::Value>,
    },
    /// `shared-state:remove`
    Remove { key: String, owner: ModuleName },
}

/// Discovery scatter/gather payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryPayload {
    /// Broadcast asking every module to identify itself.
    Request { request_id: Uuid },
    /// One module's answer.
    Response {
        request_id: Uuid,
        module: ModuleDiscovery,
    },
    /// Window closed; the collected set.
    Complete {
        request_id: Uuid,
        modules: Vec<ModuleDiscovery>,
    },
}

/// What a module reports about itself during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDiscovery {
    pub name: ModuleName,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ModuleDiscovery {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            capabilities: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }
}

/// Filter for stream subscriptions.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Exact event types to include. Empty means all types.
    pub event_types: Vec<String>,
    /// Event type prefixes to include (OR-ed with `event_types`).
    pub prefixes: Vec<String>,
    /// Source modules to include. Empty means all sources.
    pub sources: Vec<ModuleName>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific event types.
    #[must_use]
    pub fn types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            event_types: types.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Create a filter for every type starting with `prefix`.
    #[must_use]
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefixes: vec![prefix.into()],
            ..Self::default()
        }
    }

    /// Restrict to events from specific modules.
    #[must_use]
    pub fn from_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        let type_match = (self.event_types.is_empty() && self.prefixes.is_empty())
            || self.event_types.iter().any(|t| *t == event.event_type)
            || self
                .prefixes
                .iter()
                .any(|p| event.event_type.starts_with(p.as_str()));

        let source_match = self.sources.is_empty() || self.sources.contains(&event.source);

        type_match && source_match
    }
}
