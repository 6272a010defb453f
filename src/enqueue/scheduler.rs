//! # External-scheduler enqueuer.
//!
//! For hosts with a work-scheduling facility of their own: admissions are
//! delegated to it under a stable numeric job id, and the facility owns
//! keep-alive for as long as the job has uncompleted items.
//!
//! The job request is built once, at construction: the scheduler must run
//! it immediately, never deferring it for an idle window, so queued work
//! starts as soon as the facility can bind the component.

use std::sync::Arc;

use tracing::debug;

use crate::enqueue::{Enqueuer, JobId, JobIdCell};
use crate::work::{WorkId, WorkItem};

/// Standing description of the backing job, built once per component class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobSpec {
    /// Stable job identifier; identical across all admissions for a class.
    pub job_id: JobId,
    /// Whether the scheduler may hold the job back while the host is idle.
    /// Always false here: admitted work starts immediately.
    pub defer_while_idle: bool,
}

/// External work-scheduling facility the host binds the component to.
pub trait WorkScheduler<P>: Send + Sync + 'static {
    /// Enqueues one item under the standing job.
    fn submit(&self, spec: &JobSpec, item: WorkItem<P>);

    /// Acknowledges one drained item so the facility can retire it.
    fn complete(&self, spec: &JobSpec, id: &WorkId);
}

/// Enqueuer variant that delegates to an external scheduler.
pub struct SchedulerEnqueuer<P> {
    scheduler: Arc<dyn WorkScheduler<P>>,
    spec: JobSpec,
    job_id: JobIdCell,
}

impl<P: Send + 'static> SchedulerEnqueuer<P> {
    /// Creates the enqueuer, fixing the job id permanently.
    pub fn new(scheduler: Arc<dyn WorkScheduler<P>>, job_id: JobId) -> Self {
        let cell = JobIdCell::new();
        cell.ensure(job_id);
        Self {
            scheduler,
            spec: JobSpec {
                job_id,
                defer_while_idle: false,
            },
            job_id: cell,
        }
    }

    /// The standing job request submitted with every admission.
    pub fn job_spec(&self) -> &JobSpec {
        &self.spec
    }
}

impl<P: Send + 'static> Enqueuer<P> for SchedulerEnqueuer<P> {
    fn ensure_job_id(&self, job_id: JobId) {
        self.job_id.ensure(job_id);
    }

    fn enqueue(&self, item: WorkItem<P>) {
        debug!(id = %item.id(), job = %self.spec.job_id, "submitting to scheduler");
        self.scheduler.submit(&self.spec, item);
    }

    fn ack(&self, id: &WorkId) {
        self.scheduler.complete(&self.spec, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingScheduler {
        submitted: StdMutex<Vec<(JobSpec, WorkId)>>,
        completed: StdMutex<Vec<(JobSpec, WorkId)>>,
    }

    impl WorkScheduler<u32> for RecordingScheduler {
        fn submit(&self, spec: &JobSpec, item: WorkItem<u32>) {
            self.submitted
                .lock()
                .unwrap()
                .push((*spec, item.id().clone()));
        }

        fn complete(&self, spec: &JobSpec, id: &WorkId) {
            self.completed.lock().unwrap().push((*spec, id.clone()));
        }
    }

    #[test]
    fn submits_under_the_standing_job_without_deferral() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let eq = SchedulerEnqueuer::new(scheduler.clone(), JobId(5));

        eq.enqueue(WorkItem::new(1u64, 0));
        let submitted = scheduler.submitted.lock().unwrap();
        let (spec, id) = &submitted[0];
        assert_eq!(spec.job_id, JobId(5));
        assert!(!spec.defer_while_idle);
        assert_eq!(*id, WorkId::from(1u64));
    }

    #[test]
    fn matching_job_id_is_a_noop() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let eq = SchedulerEnqueuer::new(scheduler, JobId(5));
        eq.ensure_job_id(JobId(5));
        eq.ensure_job_id(JobId(5));
    }

    #[test]
    #[should_panic(expected = "different than previous")]
    fn conflicting_job_id_is_fatal() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let eq = SchedulerEnqueuer::new(scheduler, JobId(5));
        eq.ensure_job_id(JobId(7));
    }

    #[test]
    fn ack_completes_against_the_scheduler() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let eq = SchedulerEnqueuer::new(scheduler.clone(), JobId(3));

        eq.ack(&WorkId::from("w"));
        let completed = scheduler.completed.lock().unwrap();
        assert_eq!(completed[0].1, WorkId::from("w"));
    }
}
