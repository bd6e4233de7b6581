//! # Event bus for broadcasting lifecycle events.
//!
//! [`Bus`] is a wrapper around [`tokio::sync::broadcast`] that lets the
//! orchestrator broadcast [`Event`]s to any number of subscribers.
//!
//! ## Key characteristics:
//! - **Broadcast semantics**: all active subscribers receive a clone of each event
//! - **Non-persistent**: events are lost if there are no active subscribers
//! - **Bounded capacity**: old events are dropped when the channel is full
//!
//! Delivery beyond the broadcast receiver (plugin fan-out, persistence) is
//! the host's concern; the bus is the boundary.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for lifecycle events.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// When capacity is exceeded, the oldest unsent events are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// If there are no active subscribers, the event is dropped silently.
    /// This is intentional as the orchestrator can operate unobserved.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new subscriber that will receive all future events.
    ///
    /// Each call creates an independent receiver; multiple subscribers each
    /// receive a clone of every published event.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
