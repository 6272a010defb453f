//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that
//! provides non-blocking event publishing from multiple sources (tracker,
//! drain loop, executors).
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks or awaits.
//! - **Bounded capacity**: one ring buffer stores recent events for all
//!   receivers; slow receivers observe `RecvError::Lagged(n)` and skip the
//!   `n` oldest items.
//! - **No persistence**: events published with no active receivers are
//!   dropped.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender). Multiple
/// publishers can publish concurrently; each receiver observes every event
/// published after it subscribed.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new independent receiver observing subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
