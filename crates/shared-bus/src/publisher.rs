//! # Event Publisher
//!
//! The producer-facing port. Ingestion jobs depend on this trait rather than
//! on [`EventBus`](crate::EventBus) so they can be exercised against a
//! recording double.

use crate::events::{Event, EventType};
use parking_lot::Mutex;

/// Trait for publishing events to the bus.
pub trait EventPublisher: Send + Sync {
    /// Publish without blocking. Returns `false` if the event was dropped.
    fn publish(&self, event: Event) -> bool;
}

/// Publisher that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<Event>>,
}

impl RecordingPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events published so far, in order.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn of_type(&self, event_type: EventType) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: Event) -> bool {
        self.events.lock().push(event);
        true
    }
}
