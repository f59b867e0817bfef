//! # Event History
//!
//! Bounded ring of recently emitted events. Overflow drops the oldest.

use crate::events::Event;
use shared_types::Timestamp;
use std::collections::VecDeque;

#[derive(Debug)]
pub(crate) struct EventHistory {
    events: VecDeque<Event>,
    capacity: usize,
    dropped: u64,
}

impl EventHistory {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        }
    }

    pub(crate) fn push(&mut self, event: Event) {
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    /// Snapshot, optionally restricted to one event type.
    pub(crate) fn snapshot(&self, event_type: Option<&str>) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .cloned()
            .collect()
    }

    /// Events emitted at or after `since` that satisfy `pred`.
    pub(crate) fn since<F>(&self, since: Timestamp, pred: F) -> Vec<Event>
    where
        F: Fn(&Event) -> bool,
    {
        self.events
            .iter()
            .filter(|e| e.timestamp >= since && pred(e))
            .cloned()
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }
}
