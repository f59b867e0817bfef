//! # Host Runtime
//!
//! The assembled module host over the demo registry and a file-backed
//! store: the path the `module-host` binary takes, minus the signal wait.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use mh_03_lifecycle::LoadOutcome;
    use module_runtime::demo::{demo_registry, DemoWidget, BROKEN_MODULE, DEMO_MODULES};
    use module_runtime::{HostConfig, ModuleHostContext};
    use serde_json::json;
    use shared_bus::{event_types, EventFilter, LifecyclePayload, ModuleDiscovery, Subscription};
    use shared_types::LifecycleState;
    use tempfile::TempDir;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn host(dir: &TempDir) -> ModuleHostContext {
        ModuleHostContext::builder(HostConfig::for_testing(dir.path()))
            .registry(Arc::new(demo_registry()))
            .build()
            .unwrap()
    }

    /// Register, announce and load every demo module, as the binary does.
    async fn boot_demo(ctx: &ModuleHostContext) -> Vec<Subscription> {
        let mut announcements = Vec::new();
        for (name, version, capabilities) in DEMO_MODULES {
            ctx.coordinator()
                .register(name, &format!("static:{name}"))
                .await
                .unwrap();
            ctx.bus().register_module(name);

            let mut info = ModuleDiscovery::new(name).with_version(version);
            for capability in capabilities {
                info = info.with_capability(*capability);
            }
            announcements.push(ctx.bus().announce(info));

            assert!(ctx.load(&format!("{name}@{version}")).await.is_success());
        }
        announcements
    }

    // =============================================================================
    // INTEGRATION TESTS: DEMO HOST
    // =============================================================================

    /// Every demo module loads, is discoverable and ends up in the records.
    #[tokio::test]
    async fn test_demo_host_boots_and_discovers() {
        let dir = TempDir::new().unwrap();
        let ctx = host(&dir);
        ctx.start().await;
        let _announcements = boot_demo(&ctx).await;

        let charts = ctx.cache().get("charts").unwrap().module_handle.unwrap();
        assert_eq!(
            charts.downcast_ref::<DemoWidget>().unwrap().capabilities,
            vec!["render".to_string(), "export".to_string()]
        );

        let mut found: Vec<String> = ctx
            .bus()
            .discover_modules("module-host")
            .await
            .into_iter()
            .map(|m| m.name)
            .collect();
        found.sort();
        assert_eq!(found, vec!["charts", "notifications", "tables"]);

        let records = ctx.coordinator().records();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.state == LifecycleState::Loaded));
        ctx.shutdown().await;
    }

    /// The broken demo module exhausts its retries and reports it.
    #[tokio::test]
    async fn test_broken_module_reports_recovery_failed() {
        let dir = TempDir::new().unwrap();
        let ctx = host(&dir);
        ctx.start().await;
        let mut failures = ctx
            .bus()
            .stream(EventFilter::types([event_types::RECOVERY_FAILED]));

        let first = ctx.load(BROKEN_MODULE).await;
        assert!(matches!(first, LoadOutcome::Failed { attempt: 1, .. }));

        let event = tokio::time::timeout(Duration::from_secs(5), failures.recv())
            .await
            .unwrap()
            .expect("recovery-failed event");
        match event.payload.as_lifecycle() {
            Some(LifecyclePayload::RecoveryFailed { name, attempts, .. }) => {
                assert_eq!(name, BROKEN_MODULE);
                assert_eq!(*attempts, 3);
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(
            ctx.coordinator().state(BROKEN_MODULE),
            Some(LifecycleState::Error)
        );
        ctx.shutdown().await;
    }

    // =============================================================================
    // INTEGRATION TESTS: RESTART
    // =============================================================================

    /// Cache records and persistent shared state survive a restart through
    /// the store file under the data directory.
    #[tokio::test]
    async fn test_restart_from_data_dir() {
        let dir = TempDir::new().unwrap();
        {
            let ctx = host(&dir);
            ctx.start().await;
            let _announcements = boot_demo(&ctx).await;
            ctx.shared_state().set("theme", "dark", "charts", true);
            ctx.shared_state()
                .set("selection", json!({"rows": [1, 2]}), "tables", false);

            let report = ctx.shutdown().await;
            assert!(report.cache_persisted && report.state_persisted);
        }
        assert!(HostConfig::for_testing(dir.path()).store_path().exists());

        let ctx = host(&dir);
        let report = ctx.start().await;
        assert_eq!(report.cache_restored, 3);
        assert_eq!(report.state_restored, 1);
        assert_eq!(ctx.shared_state().get("theme"), Some(json!("dark")));
        assert!(ctx.shared_state().get("selection").is_none());

        assert!(matches!(
            ctx.load("tables@2.0.1").await,
            LoadOutcome::Loaded(_)
        ));
        ctx.shutdown().await;
    }

    // =============================================================================
    // INTEGRATION TESTS: METRICS
    // =============================================================================

    /// Bus events and sampled statistics show up in the exported text.
    #[tokio::test]
    async fn test_metrics_export_after_demo_run() {
        module_telemetry::register_metrics().unwrap();
        let dir = TempDir::new().unwrap();
        let ctx = host(&dir);
        ctx.start().await;
        let _announcements = boot_demo(&ctx).await;
        ctx.shared_state().set("theme", "dark", "charts", false);

        ctx.sample_metrics();
        let text = module_telemetry::encode_metrics().unwrap();

        assert!(text.contains("mh_module_loads_total"));
        assert!(text.contains("mh_shared_state_writes_total"));
        assert!(text.contains("mh_cache_entries"));
        ctx.shutdown().await;
    }
}
