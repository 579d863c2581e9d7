//! Lifecycle event bus on top of a tokio broadcast channel

use tokio::sync::broadcast;

use crate::types::EventEnvelope;

const CAPACITY: usize = 256;

/// Event bus for publishing and subscribing to lifecycle events.
///
/// Cloning is cheap and every clone feeds the same channel. Publishing never
/// blocks: slow subscribers lag and lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        Self { sender }
    }

    /// Publish an envelope to all subscribers.
    ///
    /// Returns the number of subscribers that received it; with no
    /// subscribers the event is dropped and 0 is returned.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Events published before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
