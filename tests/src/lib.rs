//! # Module Host Test Suite
//!
//! Cross-crate scenarios. Unit tests live next to the code in each crate;
//! this crate checks that the components behave together.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── lifecycle_flows.rs     # coordinator + cache + bus
//!     ├── cache_persistence.rs   # cache across restarts
//!     ├── shared_state_flows.rs  # ownership, change events, persistence
//!     └── host_runtime.rs        # full ModuleHostContext
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p mh-tests
//! cargo test -p mh-tests integration::lifecycle_flows
//! ```

pub mod integration;
