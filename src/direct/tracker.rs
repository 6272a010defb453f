//! # Direct-dispatch admission tracker.
//!
//! Every admission is dispatched right away under the policy the host's
//! classifier picks for it; the tracker's only bookkeeping job is the
//! outstanding set, and the single decision it ever makes is "did the set
//! just drain to empty". On that transition it triggers component shutdown,
//! exactly once per life episode.
//!
//! ## Architecture
//! ```text
//! signal ──► on_admit(payload, id)
//!               ├─► admit(id)            (outstanding set += id)
//!               ├─► classify(payload)    (host-supplied)
//!               ├─► dispatch:
//!               │     Inline   ─ await handler, complete
//!               │     Serial   ─ SerialExecutor (ordered, lazy)
//!               │     Pooled   ─ host hook, else WorkerPool (lazy)
//!               │     External ─ await handler; host completes later
//!               └─► RedeliverPolicy::Redeliver
//!
//! complete(id) ──► outstanding set -= id
//!                    └─ set drained? ─► ShutdownTriggered + token cancel
//! ```
//!
//! ## Rules
//! - `admit` must run exactly once per id, before any dispatch of it.
//! - `complete` must run exactly once per id; untracked ids, double
//!   completion, and empty-set completion panic (caller contract breach).
//! - No ordering is guaranteed across admissions under different policies;
//!   the shutdown decision is linearized by the outstanding-set lock.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::direct::{SerialExecutor, WorkerPool};
use crate::error::HandlerError;
use crate::events::{Bus, Event, EventKind};
use crate::work::{DirectHandler, DispatchJob, DispatchPolicy, RedeliverPolicy, WorkId};

/// Tracks outstanding admissions and dispatches each one immediately.
///
/// Construct with [`DirectTracker::new`]; hand [`Completer`] handles to
/// handlers that finish work asynchronously
/// ([`DispatchPolicy::External`]); observe [`DirectTracker::shutdown_token`]
/// to learn when the component may stop.
pub struct DirectTracker<P> {
    handler: Arc<dyn DirectHandler<P>>,
    cfg: Config,
    bus: Bus,
    outstanding: Mutex<HashSet<WorkId>>,
    shutdown: CancellationToken,
    serial: Mutex<Option<SerialExecutor>>,
    pool: Mutex<Option<WorkerPool>>,
    destroyed: AtomicBool,
}

impl<P: Send + 'static> DirectTracker<P> {
    /// Creates a new tracker around the host's handler.
    pub fn new(handler: Arc<dyn DirectHandler<P>>, cfg: Config) -> Arc<Self> {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        Arc::new(Self {
            handler,
            cfg,
            bus,
            outstanding: Mutex::new(HashSet::new()),
            shutdown: CancellationToken::new(),
            serial: Mutex::new(None),
            pool: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        })
    }

    /// The event bus this tracker publishes to.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Token canceled exactly once, when the last admission completes.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// A handle handlers can use to complete admissions later.
    ///
    /// Holds only a weak reference, so handler-owned completers never keep
    /// a destroyed tracker alive.
    pub fn completer(self: &Arc<Self>) -> Completer<P> {
        Completer {
            tracker: Arc::downgrade(self),
        }
    }

    /// Entry point for one external start signal.
    ///
    /// Records the admission, classifies it, dispatches it under the
    /// chosen policy, and tells the host to request redelivery if the
    /// component dies before completion.
    pub async fn on_admit(self: &Arc<Self>, payload: P, id: impl Into<WorkId>) -> RedeliverPolicy {
        let id = id.into();
        self.admit(id.clone());
        let policy = self.handler.classify(&payload);
        debug!(%id, ?policy, "dispatching admission");

        match policy {
            DispatchPolicy::Inline => {
                self.bus
                    .publish(Event::now(EventKind::WorkStarted).with_id(id.clone()));
                let res = self.handler.handle(payload, policy, id.clone()).await;
                self.finish(id, res);
            }
            DispatchPolicy::Serial => {
                let job = self.dispatch_job(payload, policy, id);
                self.submit_serial(job);
            }
            DispatchPolicy::Pooled => {
                let job = self.dispatch_job(payload, policy, id);
                match self.handler.provide_executor(job) {
                    Ok(()) => {}
                    Err(job) => self.submit_pooled(job),
                }
            }
            DispatchPolicy::External => {
                self.bus
                    .publish(Event::now(EventKind::WorkStarted).with_id(id.clone()));
                // The handler only kicks the work off; completion arrives
                // later through a Completer.
                if let Err(e) = self.handler.handle(payload, policy, id.clone()).await {
                    warn!(%id, error = %e, "external dispatch failed to launch");
                    self.bus.publish(
                        Event::now(EventKind::WorkFailed)
                            .with_id(id)
                            .with_error(e.to_string()),
                    );
                }
            }
        }
        RedeliverPolicy::Redeliver
    }

    /// Records one admission. Must be called exactly once per id, before
    /// any dispatch of that admission's work.
    ///
    /// # Panics
    /// If the id is already outstanding (ids must not be reused while
    /// outstanding).
    pub fn admit(&self, id: impl Into<WorkId>) {
        let id = id.into();
        {
            let mut outstanding = self.outstanding.lock().unwrap();
            if !outstanding.insert(id.clone()) {
                panic!("admission {id} is already outstanding");
            }
        }
        self.bus
            .publish(Event::now(EventKind::AdmissionAccepted).with_id(id));
    }

    /// Removes one admission and triggers shutdown if it was the last.
    ///
    /// # Panics
    /// - If nothing is outstanding (double completion or a completion the
    ///   tracker never saw admitted; either way, corrupt bookkeeping).
    /// - If the id is not tracked.
    /// - If exactly one admission remains and it is not this id.
    pub fn complete(&self, id: impl Into<WorkId>) {
        let id = id.into();
        let drained = {
            let mut outstanding = self.outstanding.lock().unwrap();
            if outstanding.len() > 1 {
                if !outstanding.remove(&id) {
                    panic!("completing admission {id} that was never admitted");
                }
                false
            } else if let Some(last) = outstanding.iter().next().cloned() {
                if last != id {
                    panic!(
                        "completing admission {id} but the only outstanding admission is {last}"
                    );
                }
                outstanding.clear();
                true
            } else {
                panic!("completing admission {id} with nothing outstanding");
            }
        };

        self.bus
            .publish(Event::now(EventKind::WorkCompleted).with_id(id.clone()));

        if drained {
            debug!(%id, "last admission completed; triggering shutdown");
            self.bus.publish(Event::now(EventKind::ShutdownTriggered));
            self.shutdown.cancel();
        }
    }

    /// Number of admissions currently outstanding.
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().unwrap().len()
    }

    /// Tears down the private executors; queued dispatches are discarded.
    ///
    /// Call when the host component is destroyed. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(serial) = self.serial.lock().unwrap().take() {
            serial.shutdown();
        }
        if let Some(pool) = self.pool.lock().unwrap().take() {
            pool.shutdown();
        }
        debug!("direct tracker destroyed");
    }

    /// Wraps one handler invocation plus its completion bookkeeping into a
    /// job an executor can run.
    fn dispatch_job(
        self: &Arc<Self>,
        payload: P,
        policy: DispatchPolicy,
        id: WorkId,
    ) -> DispatchJob {
        let me = Arc::clone(self);
        Box::pin(async move {
            me.bus
                .publish(Event::now(EventKind::WorkStarted).with_id(id.clone()));
            let res = me.handler.handle(payload, policy, id.clone()).await;
            me.finish(id, res);
        })
    }

    /// Completion bookkeeping shared by every policy the tracker completes
    /// itself: a handler error is surfaced but still counts as handled.
    fn finish(&self, id: WorkId, res: Result<(), HandlerError>) {
        if let Err(e) = res {
            warn!(%id, error = %e, label = e.as_label(), "work handler failed");
            self.bus.publish(
                Event::now(EventKind::WorkFailed)
                    .with_id(id.clone())
                    .with_error(e.to_string()),
            );
        }
        self.complete(id);
    }

    fn submit_serial(&self, job: DispatchJob) {
        if self.destroyed.load(Ordering::SeqCst) {
            warn!("tracker destroyed; discarding serial dispatch");
            return;
        }
        let mut guard = self.serial.lock().unwrap();
        let accepted = guard.get_or_insert_with(SerialExecutor::new).submit(job);
        if !accepted {
            warn!("serial executor closed; dispatch discarded");
        }
    }

    fn submit_pooled(&self, job: DispatchJob) {
        if self.destroyed.load(Ordering::SeqCst) {
            warn!("tracker destroyed; discarding pooled dispatch");
            return;
        }
        let mut guard = self.pool.lock().unwrap();
        guard
            .get_or_insert_with(|| {
                WorkerPool::new(
                    self.cfg.pool_resident_workers,
                    self.cfg.pool_max_clamped(),
                    self.cfg.pool_idle_timeout,
                )
            })
            .submit(job);
    }
}

/// Cloneable handle for completing admissions outside the tracker's own
/// dispatch, per the [`DispatchPolicy::External`] contract.
pub struct Completer<P> {
    tracker: Weak<DirectTracker<P>>,
}

impl<P> Clone for Completer<P> {
    fn clone(&self) -> Self {
        Self {
            tracker: Weak::clone(&self.tracker),
        }
    }
}

impl<P: Send + 'static> Completer<P> {
    /// Completes one admission.
    ///
    /// # Panics
    /// Same contract as [`DirectTracker::complete`].
    pub fn complete(&self, id: impl Into<WorkId>) {
        match self.tracker.upgrade() {
            Some(tracker) => tracker.complete(id),
            None => warn!("tracker dropped before completion arrived"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    /// Handler that records invocations and can hold each id until the
    /// test releases it.
    struct GatedHandler {
        policy: DispatchPolicy,
        gates: StdMutex<HashMap<WorkId, Arc<Notify>>>,
        handled: StdMutex<Vec<WorkId>>,
    }

    impl GatedHandler {
        fn new(policy: DispatchPolicy) -> Arc<Self> {
            Arc::new(Self {
                policy,
                gates: StdMutex::new(HashMap::new()),
                handled: StdMutex::new(Vec::new()),
            })
        }

        fn gate(&self, id: impl Into<WorkId>) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.gates.lock().unwrap().insert(id.into(), gate.clone());
            gate
        }

        fn handled(&self) -> Vec<WorkId> {
            self.handled.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DirectHandler<u32> for GatedHandler {
        fn classify(&self, _payload: &u32) -> DispatchPolicy {
            self.policy
        }

        async fn handle(
            &self,
            _payload: u32,
            _policy: DispatchPolicy,
            id: WorkId,
        ) -> Result<(), HandlerError> {
            let gate = self.gates.lock().unwrap().get(&id).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            self.handled.lock().unwrap().push(id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn inline_admission_completes_immediately() {
        let handler = GatedHandler::new(DispatchPolicy::Inline);
        let tracker = DirectTracker::new(handler.clone(), Config::default());
        let token = tracker.shutdown_token();

        assert_eq!(tracker.on_admit(0, 1u64).await, RedeliverPolicy::Redeliver);

        assert!(token.is_cancelled());
        assert_eq!(tracker.outstanding(), 0);
        assert_eq!(handler.handled(), vec![WorkId::from(1u64)]);
    }

    #[tokio::test]
    async fn serial_admissions_run_in_order() {
        let handler = GatedHandler::new(DispatchPolicy::Serial);
        let tracker = DirectTracker::new(handler.clone(), Config::default());
        let token = tracker.shutdown_token();

        for n in 1..=5u64 {
            tracker.on_admit(0, n).await;
        }

        timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("shutdown after all serial work");
        let ids: Vec<WorkId> = (1..=5u64).map(WorkId::from).collect();
        assert_eq!(handler.handled(), ids);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pooled_out_of_order_completion_shuts_down_after_the_last() {
        let handler = GatedHandler::new(DispatchPolicy::Pooled);
        let g1 = handler.gate(1u64);
        let g2 = handler.gate(2u64);
        let g3 = handler.gate(3u64);
        let tracker = DirectTracker::new(handler.clone(), Config::default());
        let token = tracker.shutdown_token();

        tracker.on_admit(0, 1u64).await;
        tracker.on_admit(0, 2u64).await;
        tracker.on_admit(0, 3u64).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Complete in order 3, 1, 2: shutdown only after the third.
        g3.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!token.is_cancelled());

        g1.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!token.is_cancelled());

        g2.notify_one();
        timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("shutdown after the final completion");
        assert_eq!(tracker.outstanding(), 0);
    }

    struct ExternalHandler;

    #[async_trait]
    impl DirectHandler<u32> for ExternalHandler {
        fn classify(&self, _payload: &u32) -> DispatchPolicy {
            DispatchPolicy::External
        }

        async fn handle(
            &self,
            _payload: u32,
            _policy: DispatchPolicy,
            _id: WorkId,
        ) -> Result<(), HandlerError> {
            // Pretend to hand the work to some async machinery.
            Ok(())
        }
    }

    #[tokio::test]
    async fn external_admissions_wait_for_the_completer() {
        let tracker = DirectTracker::new(Arc::new(ExternalHandler), Config::default());
        let token = tracker.shutdown_token();
        let completer = tracker.completer();

        tracker.on_admit(0, "a").await;
        tracker.on_admit(0, "b").await;
        assert!(!token.is_cancelled());
        assert_eq!(tracker.outstanding(), 2);

        completer.complete("b");
        assert!(!token.is_cancelled());
        completer.complete("a");
        assert!(token.is_cancelled());
    }

    struct ClaimingHandler {
        claimed: StdMutex<Vec<DispatchJob>>,
    }

    #[async_trait]
    impl DirectHandler<u32> for ClaimingHandler {
        fn classify(&self, _payload: &u32) -> DispatchPolicy {
            DispatchPolicy::Pooled
        }

        async fn handle(
            &self,
            _payload: u32,
            _policy: DispatchPolicy,
            _id: WorkId,
        ) -> Result<(), HandlerError> {
            Ok(())
        }

        fn provide_executor(&self, job: DispatchJob) -> Result<(), DispatchJob> {
            self.claimed.lock().unwrap().push(job);
            Ok(())
        }
    }

    #[tokio::test]
    async fn host_executor_hook_bypasses_the_pool() {
        let handler = Arc::new(ClaimingHandler {
            claimed: StdMutex::new(Vec::new()),
        });
        let tracker = DirectTracker::new(handler.clone(), Config::default());
        let token = tracker.shutdown_token();

        tracker.on_admit(0, 9u64).await;
        assert!(!token.is_cancelled(), "job not run yet");

        let job = handler.claimed.lock().unwrap().pop().expect("claimed job");
        job.await;
        assert!(token.is_cancelled());
    }

    #[test]
    #[should_panic(expected = "nothing outstanding")]
    fn completing_with_nothing_outstanding_panics() {
        let tracker = DirectTracker::new(GatedHandler::new(DispatchPolicy::Inline), Config::default());
        tracker.complete(1u64);
    }

    #[test]
    #[should_panic(expected = "only outstanding admission")]
    fn completing_a_mismatched_final_id_panics() {
        let tracker = DirectTracker::new(GatedHandler::new(DispatchPolicy::Inline), Config::default());
        tracker.admit(1u64);
        tracker.complete(2u64);
    }

    #[test]
    #[should_panic(expected = "never admitted")]
    fn completing_an_untracked_id_panics() {
        let tracker = DirectTracker::new(GatedHandler::new(DispatchPolicy::Inline), Config::default());
        tracker.admit(1u64);
        tracker.admit(2u64);
        tracker.complete(3u64);
    }

    #[test]
    #[should_panic(expected = "already outstanding")]
    fn double_admission_panics() {
        let tracker = DirectTracker::new(GatedHandler::new(DispatchPolicy::Inline), Config::default());
        tracker.admit(1u64);
        tracker.admit(1u64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn interleaved_completions_drain_exactly_once() {
        let tracker = DirectTracker::new(Arc::new(ExternalHandler), Config::default());
        let completer = tracker.completer();
        let mut rx = tracker.bus().subscribe();
        let token = tracker.shutdown_token();

        for n in 0..16u64 {
            tracker.on_admit(0, n).await;
        }

        let mut joins = Vec::new();
        for n in 0..16u64 {
            let completer = completer.clone();
            joins.push(tokio::spawn(async move {
                completer.complete(n);
            }));
        }
        for j in joins {
            j.await.unwrap();
        }

        assert!(token.is_cancelled());
        assert_eq!(tracker.outstanding(), 0);

        let mut shutdowns = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::ShutdownTriggered {
                shutdowns += 1;
            }
        }
        assert_eq!(shutdowns, 1, "shutdown must fire exactly once");
    }
}
