//! # Runtime events emitted by the tracker, the drain engine, and executors.
//!
//! [`EventKind`] classifies events across three categories:
//! - **Admission events**: work accepted, handled, completed, failed
//! - **Drain events**: processing runs starting and finishing
//! - **Lifecycle events**: stop requested, shutdown triggered
//!
//! ## Ordering guarantees
//! Each event carries a globally unique sequence number (`seq`) that
//! increases monotonically. Use `seq` to restore the exact order when
//! events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use worklatch::{Event, EventKind, WorkId};
//!
//! let ev = Event::now(EventKind::WorkFailed)
//!     .with_id(WorkId::from(7u64))
//!     .with_error("boom");
//!
//! assert_eq!(ev.kind, EventKind::WorkFailed);
//! assert_eq!(ev.id.as_ref().map(|id| id.to_string()), Some("7".into()));
//! assert_eq!(ev.error.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::work::WorkId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Admission events ===
    /// An admission was recorded and will be dispatched.
    ///
    /// Sets: `id`, `at`, `seq`.
    AdmissionAccepted,

    /// The handler was invoked for one admission.
    ///
    /// Sets: `id`, `at`, `seq`.
    WorkStarted,

    /// One admission was completed and removed from tracking.
    ///
    /// Sets: `id`, `at`, `seq`.
    WorkCompleted,

    /// The handler returned an error for one admission.
    ///
    /// Sets: `id`, `error`, `at`, `seq`.
    WorkFailed,

    // === Drain events ===
    /// A drain loop began processing the work queue.
    ///
    /// Sets: `at`, `seq`.
    DrainStarted,

    /// The drain loop finished and went idle (or exited on stop).
    ///
    /// Sets: `at`, `seq`.
    DrainFinished,

    // === Lifecycle events ===
    /// The external canceling authority asked the component to stop.
    ///
    /// Sets: `at`, `seq`.
    StopRequested,

    /// The last outstanding admission completed; the component may shut down.
    ///
    /// Emitted exactly once per life episode.
    ///
    /// Sets: `at`, `seq`.
    ShutdownTriggered,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - `id`/`error` are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Admission id, if applicable.
    pub id: Option<WorkId>,
    /// Human-readable error message, if applicable.
    pub error: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            id: None,
            error: None,
        }
    }

    /// Attaches an admission id.
    #[inline]
    pub fn with_id(mut self, id: WorkId) -> Self {
        self.id = Some(id);
        self
    }

    /// Attaches a human-readable error message.
    #[inline]
    pub fn with_error(mut self, error: impl Into<Arc<str>>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::now(EventKind::DrainStarted);
        let b = Event::now(EventKind::DrainFinished);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_attach_metadata() {
        let ev = Event::now(EventKind::WorkFailed)
            .with_id(WorkId::from("job-1"))
            .with_error("refused");
        assert_eq!(ev.id, Some(WorkId::from("job-1")));
        assert_eq!(ev.error.as_deref(), Some("refused"));
    }
}
