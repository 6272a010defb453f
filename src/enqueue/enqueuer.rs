//! # The enqueuer contract.
//!
//! An [`Enqueuer`] mediates how admissions reach a component class and how
//! keep-alive or external-scheduler state is tracked around them. One
//! instance exists per component class for the whole process lifetime (see
//! [`EnqueuerRegistry`](crate::EnqueuerRegistry)); its state intentionally
//! outlives any single life episode of the component.
//!
//! Two variants share this contract surface:
//! - [`KeepAliveEnqueuer`](crate::KeepAliveEnqueuer) — explicit keep-alive
//!   leases around delivery and processing.
//! - [`SchedulerEnqueuer`](crate::SchedulerEnqueuer) — delegates to an
//!   external work-scheduling facility under a stable job id.

use std::fmt;
use std::sync::Mutex;

use crate::work::{WorkId, WorkItem};

/// Stable numeric identifier binding a component class to its external
/// scheduler job. Must be identical across all admissions for a class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mediates admission delivery and cross-episode keep-alive/scheduler state
/// for one component class.
pub trait Enqueuer<P>: Send + Sync + 'static {
    /// Fixes the job id for this component class.
    ///
    /// The first call wins permanently; repeated calls with the same id are
    /// no-ops.
    ///
    /// # Panics
    /// If called with an id different from the one already fixed: a fatal
    /// configuration error.
    fn ensure_job_id(&self, job_id: JobId);

    /// Routes one admission toward the component.
    fn enqueue(&self, item: WorkItem<P>);

    /// Acknowledges one fully-handled admission to whatever authority
    /// delivered it.
    fn ack(&self, id: &WorkId);

    /// The component observed a start signal; the last delivery can be
    /// considered handed over.
    fn start_received(&self) {}

    /// A drain run actually began processing.
    fn processing_started(&self) {}

    /// The drain run finished and the component went idle.
    fn processing_finished(&self) {}
}

/// Write-once job id shared by both enqueuer variants.
pub(crate) struct JobIdCell {
    fixed: Mutex<Option<JobId>>,
}

impl JobIdCell {
    pub(crate) fn new() -> Self {
        Self {
            fixed: Mutex::new(None),
        }
    }

    /// First call fixes the id; later mismatches are fatal.
    pub(crate) fn ensure(&self, job_id: JobId) {
        let mut fixed = self.fixed.lock().unwrap();
        match *fixed {
            None => *fixed = Some(job_id),
            Some(existing) if existing == job_id => {}
            Some(existing) => panic!(
                "given job id {job_id} is different than previous {existing}"
            ),
        }
    }

    #[cfg(test)]
    pub(crate) fn get(&self) -> Option<JobId> {
        *self.fixed.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_id_wins_and_repeats_are_noops() {
        let cell = JobIdCell::new();
        cell.ensure(JobId(5));
        cell.ensure(JobId(5));
        assert_eq!(cell.get(), Some(JobId(5)));
    }

    #[test]
    #[should_panic(expected = "different than previous")]
    fn conflicting_id_panics() {
        let cell = JobIdCell::new();
        cell.ensure(JobId(5));
        cell.ensure(JobId(7));
    }
}
