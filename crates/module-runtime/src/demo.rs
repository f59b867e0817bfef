//! # Demo Modules
//!
//! Modules compiled into the `module-host` binary so the substrate can be
//! exercised without a bundle server.

use mh_03_lifecycle::StaticModuleRegistry;
use serde::Serialize;
use shared_types::ModuleHandle;

/// A sample widget module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoWidget {
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
}

impl DemoWidget {
    fn handle(name: &str, version: &str, capabilities: &[&str]) -> ModuleHandle {
        ModuleHandle::new(Self {
            name: name.to_string(),
            version: version.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        })
    }
}

/// `(name, version, capabilities)` of every demo module that loads.
pub const DEMO_MODULES: [(&str, &str, &[&str]); 3] = [
    ("charts", "1.2.0", &["render", "export"]),
    ("tables", "2.0.1", &["render", "sort"]),
    ("notifications", "0.9.0", &["toast"]),
];

/// Demo module whose factory always fails, to show retries and
/// `module:recovery-failed`.
pub const BROKEN_MODULE: &str = "legacy-reports";

/// Registry preloaded with the demo modules.
pub fn demo_registry() -> StaticModuleRegistry {
    let registry = StaticModuleRegistry::new();
    for (name, version, capabilities) in DEMO_MODULES {
        registry.provide(name, version, move || {
            Ok(DemoWidget::handle(name, version, capabilities))
        });
    }
    registry.provide(BROKEN_MODULE, "0.1.0", || {
        Err("bundle failed to evaluate".to_string())
    });
    registry
}
