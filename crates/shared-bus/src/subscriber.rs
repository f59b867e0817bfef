//! # Event Subscriber
//!
//! Defines the subscription side of the event bus.
//!
//! Two flavours exist:
//!
//! - [`Subscription`]: guard for a synchronous handler invoked inside
//!   `emit`. Dropping it (or calling [`Subscription::unsubscribe`]) removes
//!   the handler.
//! - [`EventReceiver`]: bounded queue fed by the bus. A receiver that falls
//!   behind loses its oldest events instead of slowing the emitter.

use crate::events::{Event, EventFilter};
use crate::publisher::BusInner;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

/// Errors returned by a handler. Logged by the bus, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for synchronous handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Errors from receiver operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was closed.
    #[error("Event bus closed")]
    Closed,
}

/// Handle for a registered synchronous handler.
///
/// When dropped, the handler is removed from the bus.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    channel: String,
    id: u64,
    bus: Weak<BusInner>,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(channel: String, id: u64, bus: Weak<BusInner>) -> Self {
        Self {
            channel,
            id,
            bus,
            active: true,
        }
    }

    /// Channel this handler listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Remove the handler now.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Keep the handler registered for the lifetime of the bus.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn remove(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(bus) = self.bus.upgrade() {
            bus.remove_handler(&self.channel, self.id);
            debug!(channel = %self.channel, "Subscription dropped");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

/// A bounded, filtered queue of emitted events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Event>,
    filter: EventFilter,
    lagged: u64,
}

impl EventReceiver {
    pub(crate) fn new(receiver: broadcast::Receiver<Event>, filter: EventFilter) -> Self {
        Self {
            receiver,
            filter,
            lagged: 0,
        }
    }

    /// Receive the next event that matches the filter.
    ///
    /// # Returns
    ///
    /// - `Some(event)` - The next matching event
    /// - `None` - The channel was closed (bus dropped)
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    self.lagged += count;
                    debug!(lagged = count, "Receiver lagged, oldest events dropped");
                    continue;
                }
            };

            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }

    /// Try to receive the next event without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(event))` - An event was available and matched
    /// - `Ok(None)` - No event available (would block)
    /// - `Err(SubscriptionError::Closed)` - The channel was closed
    pub fn try_recv(&mut self) -> Result<Option<Event>, SubscriptionError> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(e) => e,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    self.lagged += count;
                    continue;
                }
            };

            if self.filter.matches(&event) {
                return Ok(Some(event));
            }
        }
    }

    /// Total events this receiver lost to overflow.
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    /// Get the filter for this receiver.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Convert into a `Stream`.
    pub fn into_stream(self) -> EventStream {
        EventStream {
            inner: BroadcastStream::new(self.receiver),
            filter: self.filter,
        }
    }
}

/// A stream wrapper for receivers.
///
/// Implements `tokio_stream::Stream` for use with stream combinators.
/// Lagged gaps are skipped silently.
pub struct EventStream {
    inner: BroadcastStream<Event>,
    filter: EventFilter,
}

impl EventStream {
    /// Get the filter for this stream.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if self.filter.matches(&event) {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
                    debug!(lagged = count, "Stream lagged, oldest events dropped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
