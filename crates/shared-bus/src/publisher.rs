//! # Event Publisher
//!
//! The in-process event bus.
//!
//! ## Delivery model
//!
//! `emit` appends to the bounded history, then invokes every handler of the
//! event type synchronously, in registration order. Targeted events are
//! delivered a second time on `"<type>:<target>"`. Finally the event is
//! offered to every `stream()` receiver through a bounded broadcast channel
//! that drops the oldest entries for receivers that fall behind.
//!
//! Emitted events enter a single FIFO delivery queue, recorded in history
//! at the same moment, so history order and delivery order agree. One
//! thread at a time drains the queue and runs handlers; no bus lock is held
//! while a handler runs. An emitter that finds another thread draining
//! leaves its event to that thread and returns at once, so `emit` never
//! waits on handlers running elsewhere. It only runs handlers on its own
//! thread, including events handed over by other emitters while it drains.
//!
//! A handler may itself emit. The nested event is queued behind the one
//! being delivered and still reaches every handler before the outer `emit`
//! returns.
//!
//! Callers that must fix an event's position while holding a lock of their
//! own use [`EventBus::post`] under that lock and [`EventBus::flush`] after
//! releasing it.
//!
//! Handler failures (errors or panics) are counted and logged. They never
//! unsubscribe the handler and never reach the emitter.

use crate::config::BusConfig;
use crate::events::{is_replayable, replay_channel, targeted_channel, Event, EventFilter, EventPayload};
use crate::history::EventHistory;
use crate::subscriber::{EventReceiver, HandlerResult, Subscription};
use parking_lot::{Mutex, RwLock};
use shared_types::{ModuleName, SystemTimeSource, TimeSource};
use std::any::Any;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Handler = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

#[derive(Clone)]
struct HandlerSlot {
    id: u64,
    handler: Handler,
}

/// A queued delivery and the channels it goes out on.
struct Pending {
    event: Event,
    channels: Vec<String>,
    to_streams: bool,
}

/// Clears the draining flag even if delivery unwinds.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Counters describing bus activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusStats {
    /// Events emitted (replays excluded).
    pub events_emitted: u64,
    /// Events redelivered on replay channels.
    pub events_replayed: u64,
    /// Handler invocations that returned an error or panicked.
    pub handler_failures: u64,
    /// Events currently retained in history.
    pub history_len: usize,
    /// Events pushed out of history by overflow.
    pub history_dropped: u64,
    /// Registered synchronous handlers across all channels.
    pub handlers: usize,
    /// Modules registered through `register_module`.
    pub registered_modules: usize,
}

pub(crate) struct BusInner {
    config: BusConfig,
    clock: Arc<dyn TimeSource>,
    handlers: RwLock<HashMap<String, Vec<HandlerSlot>>>,
    history: Mutex<EventHistory>,
    queue: Mutex<VecDeque<Pending>>,
    draining: AtomicBool,
    stream_tx: broadcast::Sender<Event>,
    registered: RwLock<BTreeSet<ModuleName>>,
    next_handler_id: AtomicU64,
    events_emitted: AtomicU64,
    events_replayed: AtomicU64,
    handler_failures: AtomicU64,
}

impl BusInner {
    pub(crate) fn remove_handler(&self, channel: &str, id: u64) {
        let mut handlers = self.handlers.write();
        if let Some(slots) = handlers.get_mut(channel) {
            slots.retain(|slot| slot.id != id);
            if slots.is_empty() {
                handlers.remove(channel);
            }
        }
    }

    fn handlers_for(&self, channel: &str) -> Vec<HandlerSlot> {
        self.handlers
            .read()
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Queue a broadcast or targeted event; history is written in the same
    /// critical section so both orders match.
    fn enqueue(&self, event: Event) -> Event {
        let mut channels = vec![event.event_type.clone()];
        if let Some(target) = &event.target {
            channels.push(targeted_channel(&event.event_type, target));
        }

        let mut queue = self.queue.lock();
        self.history.lock().push(event.clone());
        queue.push_back(Pending {
            event: event.clone(),
            channels,
            to_streams: true,
        });
        event
    }

    /// Queue a replay on its target's channel only. Not recorded.
    fn enqueue_replay(&self, event: Event, target: &str) {
        let channel = targeted_channel(&event.event_type, target);
        self.queue.lock().push_back(Pending {
            event,
            channels: vec![channel],
            to_streams: false,
        });
    }

    /// Deliver queued events until the queue is empty, unless another
    /// thread (or an outer frame on this one) is already draining.
    fn drain(&self) {
        loop {
            if self.draining.swap(true, Ordering::AcqRel) {
                return;
            }
            {
                let _guard = DrainGuard(&self.draining);
                loop {
                    let next = self.queue.lock().pop_front();
                    let Some(pending) = next else {
                        break;
                    };
                    self.deliver(&pending);
                }
            }
            // An event queued after the last pop but before the flag was
            // cleared saw the flag still set; pick it up here.
            if self.queue.lock().is_empty() {
                return;
            }
        }
    }

    fn deliver(&self, pending: &Pending) {
        let event = &pending.event;
        // Handlers are cloned out so they can subscribe or unsubscribe
        // while being invoked.
        for channel in &pending.channels {
            for slot in self.handlers_for(channel) {
                self.invoke(&slot, channel, event);
            }
        }

        if pending.to_streams {
            // No receivers is not an error.
            let _ = self.stream_tx.send(event.clone());
        }
    }

    fn invoke(&self, slot: &HandlerSlot, channel: &str, event: &Event) {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (slot.handler)(event)));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.handler_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    channel = %channel,
                    source = %event.source,
                    handler = slot.id,
                    error = %e,
                    "Event handler failed"
                );
            }
            Err(panic) => {
                self.handler_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    channel = %channel,
                    source = %event.source,
                    handler = slot.id,
                    panic = %panic_message(panic.as_ref()),
                    "Event handler panicked"
                );
            }
        }

        let elapsed = started.elapsed();
        if elapsed > self.config.slow_handler_warn() {
            warn!(
                channel = %channel,
                handler = slot.id,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow event handler"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Publish/subscribe bus shared by every module.
///
/// Cloning is cheap; clones share handlers, history and receivers.
#[derive(Clone)]
pub struct EventBus {
    pub(crate) inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus reading wall-clock time.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemTimeSource))
    }

    /// Create a bus with an explicit time source.
    #[must_use]
    pub fn with_clock(config: BusConfig, clock: Arc<dyn TimeSource>) -> Self {
        let (stream_tx, _) = broadcast::channel(config.stream_capacity.max(1));
        let history = EventHistory::new(config.history_size);
        Self {
            inner: Arc::new(BusInner {
                config,
                clock,
                handlers: RwLock::new(HashMap::new()),
                history: Mutex::new(history),
                queue: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
                stream_tx,
                registered: RwLock::new(BTreeSet::new()),
                next_handler_id: AtomicU64::new(1),
                events_emitted: AtomicU64::new(0),
                events_replayed: AtomicU64::new(0),
                handler_failures: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<BusInner>) -> Self {
        Self { inner }
    }

    /// Bus configuration.
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Current time according to the bus clock.
    pub fn now(&self) -> shared_types::Timestamp {
        self.inner.clock.now()
    }

    /// Register `handler` for events of `event_type`.
    ///
    /// The handler stays registered until the returned guard is dropped.
    pub fn subscribe<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push(HandlerSlot {
                id,
                handler: Arc::new(handler),
            });
        debug!(channel = %event_type, handler = id, "Handler subscribed");
        Subscription::new(event_type.to_string(), id, Arc::downgrade(&self.inner))
    }

    /// Like [`subscribe`](Self::subscribe), but only events emitted by
    /// `source` reach the handler.
    pub fn subscribe_from<F>(&self, event_type: &str, source: &str, handler: F) -> Subscription
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        let source = source.to_string();
        self.subscribe(event_type, move |event| {
            if event.source == source {
                handler(event)
            } else {
                Ok(())
            }
        })
    }

    /// Subscribe to events of `event_type` addressed to `target` only.
    pub fn subscribe_to<F>(&self, event_type: &str, target: &str, handler: F) -> Subscription
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(&targeted_channel(event_type, target), handler)
    }

    /// Broadcast an event. Returns the emitted event.
    ///
    /// Handlers have run by the time this returns unless another thread was
    /// already delivering, in which case that thread delivers this event
    /// in queue order.
    pub fn emit(&self, event_type: &str, payload: EventPayload, source: &str) -> Event {
        let event = self.post(event_type, payload, source);
        self.inner.drain();
        event
    }

    /// Record and queue an event without delivering it.
    ///
    /// The event is delivered, in queue order, by the next `emit`,
    /// `emit_to` or [`flush`](Self::flush) on any thread.
    pub fn post(&self, event_type: &str, payload: EventPayload, source: &str) -> Event {
        let event = Event::new(event_type, payload, source, None, self.inner.clock.now());
        self.inner.events_emitted.fetch_add(1, Ordering::Relaxed);
        self.inner.enqueue(event)
    }

    /// Deliver every queued event, unless another thread is already doing so.
    pub fn flush(&self) {
        self.inner.drain();
    }

    /// Emit an event addressed to `target`.
    ///
    /// Delivered on `event_type` and on `"<event_type>:<target>"`.
    pub fn emit_to(
        &self,
        event_type: &str,
        payload: EventPayload,
        source: &str,
        target: &str,
    ) -> Event {
        let event = Event::new(
            event_type,
            payload,
            source,
            Some(target),
            self.inner.clock.now(),
        );
        self.inner.events_emitted.fetch_add(1, Ordering::Relaxed);
        let event = self.inner.enqueue(event);
        self.inner.drain();
        event
    }

    /// Snapshot of retained events, oldest first.
    pub fn history(&self, event_type: Option<&str>) -> Vec<Event> {
        self.inner.history.lock().snapshot(event_type)
    }

    pub fn clear_history(&self) {
        self.inner.history.lock().clear();
        debug!("Event history cleared");
    }

    /// Register a module with the bus and replay recent state to it.
    ///
    /// Every retained `module:*` / `shared-state:*` event from the replay
    /// window is redelivered to `name` alone, on `"replay:<type>:<name>"`,
    /// with its original source and timestamp. Replays are not added to
    /// history and are not offered to `stream()` receivers.
    ///
    /// Returns the number of replayed events.
    pub fn register_module(&self, name: &str) -> usize {
        let newly_registered = self.inner.registered.write().insert(name.to_string());

        let since = self
            .inner
            .clock
            .now()
            .saturating_sub(self.inner.config.replay_window_ms);
        let missed = self
            .inner
            .history
            .lock()
            .since(since, |e| is_replayable(&e.event_type));

        for original in &missed {
            let replayed = Event {
                id: Uuid::new_v4(),
                event_type: replay_channel(&original.event_type),
                source: original.source.clone(),
                target: Some(name.to_string()),
                payload: original.payload.clone(),
                timestamp: original.timestamp,
            };
            self.inner.enqueue_replay(replayed, name);
        }
        self.inner.drain();
        self.inner
            .events_replayed
            .fetch_add(missed.len() as u64, Ordering::Relaxed);

        info!(
            module = %name,
            replayed = missed.len(),
            first_registration = newly_registered,
            "Module registered with event bus"
        );
        missed.len()
    }

    /// Returns true if the module was registered.
    pub fn unregister_module(&self, name: &str) -> bool {
        let removed = self.inner.registered.write().remove(name);
        if removed {
            info!(module = %name, "Module unregistered from event bus");
        }
        removed
    }

    /// Registered module names, sorted.
    pub fn registered_modules(&self) -> Vec<ModuleName> {
        self.inner.registered.read().iter().cloned().collect()
    }

    /// Open a bounded async receiver for events matching `filter`.
    ///
    /// Only events emitted after this call are received.
    pub fn stream(&self, filter: EventFilter) -> EventReceiver {
        EventReceiver::new(self.inner.stream_tx.subscribe(), filter)
    }

    /// Handlers registered on exactly `channel`.
    pub fn handler_count(&self, channel: &str) -> usize {
        self.inner
            .handlers
            .read()
            .get(channel)
            .map_or(0, Vec::len)
    }

    pub fn stats(&self) -> BusStats {
        let (history_len, history_dropped) = {
            let history = self.inner.history.lock();
            (history.len(), history.dropped())
        };
        BusStats {
            events_emitted: self.inner.events_emitted.load(Ordering::Relaxed),
            events_replayed: self.inner.events_replayed.load(Ordering::Relaxed),
            handler_failures: self.inner.handler_failures.load(Ordering::Relaxed),
            history_len,
            history_dropped,
            handlers: self.inner.handlers.read().values().map(Vec::len).sum(),
            registered_modules: self.inner.registered.read().len(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("stats", &self.stats())
            .finish()
    }
}
