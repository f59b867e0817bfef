//! # Module Discovery
//!
//! Scatter/gather over the bus: a `discovery:request` broadcast, responses
//! collected for a fixed window, then a `discovery:complete` event carrying
//! the collected set. Responses arriving after the window are ignored.

use crate::events::{event_types, DiscoveryPayload, EventPayload, ModuleDiscovery};
use crate::publisher::EventBus;
use crate::subscriber::Subscription;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

impl EventBus {
    /// Discover modules using the configured window.
    pub async fn discover_modules(&self, source: &str) -> Vec<ModuleDiscovery> {
        let window = self.config().discovery_window();
        self.discover_modules_within(source, window).await
    }

    /// Discover modules, collecting responses for `window`.
    ///
    /// Duplicate responses from one module keep the first answer.
    pub async fn discover_modules_within(
        &self,
        source: &str,
        window: Duration,
    ) -> Vec<ModuleDiscovery> {
        let request_id = Uuid::new_v4();
        let collected: Arc<Mutex<Vec<ModuleDiscovery>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = collected.clone();
        let responses = self.subscribe(event_types::DISCOVERY_RESPONSE, move |event| {
            if let EventPayload::Discovery(DiscoveryPayload::Response {
                request_id: answered,
                module,
            }) = &event.payload
            {
                if *answered == request_id {
                    let mut modules = sink.lock();
                    if !modules.iter().any(|m| m.name == module.name) {
                        modules.push(module.clone());
                    }
                }
            }
            Ok(())
        });

        debug!(%request_id, window_ms = window.as_millis() as u64, "Discovery started");
        self.emit(
            event_types::DISCOVERY_REQUEST,
            EventPayload::Discovery(DiscoveryPayload::Request { request_id }),
            source,
        );

        tokio::time::sleep(window).await;
        responses.unsubscribe();

        let modules = std::mem::take(&mut *collected.lock());
        self.emit(
            event_types::DISCOVERY_COMPLETE,
            EventPayload::Discovery(DiscoveryPayload::Complete {
                request_id,
                modules: modules.clone(),
            }),
            source,
        );

        info!(%request_id, found = modules.len(), "Discovery complete");
        modules
    }

    /// Answer every discovery request on behalf of a module until the
    /// returned guard is dropped.
    pub fn announce(&self, info: ModuleDiscovery) -> Subscription {
        let bus = Arc::downgrade(&self.inner);
        self.subscribe(event_types::DISCOVERY_REQUEST, move |event| {
            let (Some(inner), EventPayload::Discovery(DiscoveryPayload::Request { request_id })) =
                (bus.upgrade(), &event.payload)
            else {
                return Ok(());
            };
            EventBus::from_inner(inner).emit_to(
                event_types::DISCOVERY_RESPONSE,
                EventPayload::Discovery(DiscoveryPayload::Response {
                    request_id: *request_id,
                    module: info.clone(),
                }),
                &info.name,
                &event.source,
            );
            Ok(())
        })
    }
}
