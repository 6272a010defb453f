//! # Sequential drain engine.
//!
//! Admissions land in an internal FIFO queue; a single background drain
//! task pulls them off one at a time, invokes the work handler, and
//! signals each item's completion through the component's
//! [`Enqueuer`](crate::Enqueuer). When the queue is observed empty the
//! task finalizes (after re-checking for items that raced in) and the
//! enqueuer is told processing finished.
//!
//! ## Drain loop state machine
//! ```text
//!            admit() with queue empty
//!    Idle ──────────────────────────────► Running
//!     ▲                                      │
//!     │  queue observed empty                │ request_stop()
//!     │  (after restart re-check)            ▼
//!     └──────────────────────────────── Stopping
//!                                            │
//!                    current item finishes   │
//!                    (or is interrupted)     ▼
//!                                      loop exits, stopped
//!                                      flag stays set forever
//! ```
//!
//! ## Rules
//! - Items are handled strictly in arrival order, once each.
//! - At most one drain task is live per engine; starting a second is a
//!   no-op guarded by the queue lock.
//! - A stop only prevents the *next* dequeue unless the host opted into
//!   interruption, in which case the in-flight handler future is dropped
//!   and the current item's completion is still signaled best-effort.
//! - A handler error ends the current run without touching the rest of
//!   the queue; the failed item is acknowledged and never retried here.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::enqueue::Enqueuer;
use crate::events::{Bus, Event, EventKind};
use crate::work::{RedeliverPolicy, WorkHandler, WorkItem};

/// Status of the drain loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// No drain task live; the next admission starts one.
    Idle,
    /// A drain task is pulling items off the queue.
    Running,
    /// A stop was requested; the live task is winding down.
    Stopping,
}

/// Work queue and loop-singleton state, guarded by one lock.
struct EngineCore<P> {
    queue: VecDeque<WorkItem<P>>,
    state: DrainState,
    destroyed: bool,
}

/// How one processing run ended.
enum RunEnd {
    /// The queue was observed empty.
    Drained,
    /// A stop request ended the run.
    Stopped,
    /// The handler returned an error for some item.
    Failed,
}

/// Queued sequential processor with automatic lifecycle tracking.
///
/// See the [module docs](self) for the state machine. Construct with
/// [`DrainEngine::new`], feed it with [`DrainEngine::admit`], and wire the
/// external scheduler's callbacks to [`DrainEngine::begin_draining`] and
/// [`DrainEngine::request_stop`].
pub struct DrainEngine<P> {
    handler: Arc<dyn WorkHandler<P>>,
    enqueuer: Arc<dyn Enqueuer<P>>,
    bus: Bus,
    core: Mutex<EngineCore<P>>,
    stopped: AtomicBool,
    interrupt_if_stopped: AtomicBool,
    stop_token: CancellationToken,
}

impl<P: Send + 'static> DrainEngine<P> {
    /// Creates a new engine around the host's handler and the component
    /// class's enqueuer.
    pub fn new(
        handler: Arc<dyn WorkHandler<P>>,
        enqueuer: Arc<dyn Enqueuer<P>>,
        cfg: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler,
            enqueuer,
            bus: Bus::new(cfg.bus_capacity_clamped()),
            core: Mutex::new(EngineCore {
                queue: VecDeque::new(),
                state: DrainState::Idle,
                destroyed: false,
            }),
            stopped: AtomicBool::new(false),
            interrupt_if_stopped: AtomicBool::new(false),
            stop_token: CancellationToken::new(),
        })
    }

    /// The event bus this engine publishes to.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Appends one admission and makes sure a drain task is live.
    ///
    /// Must be called inside a tokio runtime. Always asks the host to
    /// redeliver the signal if the component dies before the item is
    /// acknowledged.
    pub fn admit(self: &Arc<Self>, item: WorkItem<P>) -> RedeliverPolicy {
        self.enqueuer.start_received();
        debug!(id = %item.id(), "queueing admission");
        self.bus
            .publish(Event::now(EventKind::AdmissionAccepted).with_id(item.id().clone()));
        self.ensure_running(item, true);
        RedeliverPolicy::Redeliver
    }

    /// External-scheduler inbound callback: the backing job started, begin
    /// draining whatever has been queued. Returns `true` (the engine takes
    /// over from here).
    pub fn begin_draining(self: &Arc<Self>) -> bool {
        let spawn = {
            let mut core = self.core.lock().unwrap();
            self.take_loop_slot(&mut core)
        };
        if spawn {
            self.spawn_drain();
        }
        true
    }

    /// External stop request.
    ///
    /// Permanently marks this life episode stopped, cancels the stop
    /// token (interrupting the in-flight handler iff the host opted in via
    /// [`DrainEngine::set_interrupt_if_stopped`]), and returns the
    /// handler's verdict on whether unfinished work should be redelivered.
    pub fn request_stop(&self) -> bool {
        self.stopped.store(true, Ordering::SeqCst);
        {
            let mut core = self.core.lock().unwrap();
            if core.state == DrainState::Running {
                core.state = DrainState::Stopping;
            }
        }
        self.bus.publish(Event::now(EventKind::StopRequested));
        self.stop_token.cancel();
        self.handler.on_stop_requested()
    }

    /// Whether a stop has ever been requested for this life episode.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Opts the engine in or out of interrupting the in-flight handler on
    /// stop. Defaults to out: the current item runs to completion.
    pub fn set_interrupt_if_stopped(&self, interrupt: bool) {
        self.interrupt_if_stopped.store(interrupt, Ordering::SeqCst);
    }

    /// Current drain-loop state.
    pub fn state(&self) -> DrainState {
        self.core.lock().unwrap().state
    }

    /// Number of items queued and not yet picked up.
    pub fn queued(&self) -> usize {
        self.core.lock().unwrap().queue.len()
    }

    /// Marks the engine destroyed and reports `processing_finished` so the
    /// enqueuer can settle its keep-alive state. Idempotent in effect: the
    /// report only fires on the first call.
    pub fn destroy(&self) {
        let report = {
            let mut core = self.core.lock().unwrap();
            let first = !core.destroyed;
            core.destroyed = true;
            first
        };
        if report {
            debug!("drain engine destroyed");
            self.enqueuer.processing_finished();
        }
    }

    /// Appends the item and claims the loop slot if it is free, spawning
    /// the drain task when this caller won the slot.
    fn ensure_running(self: &Arc<Self>, item: WorkItem<P>, report_started: bool) {
        let spawn = {
            let mut core = self.core.lock().unwrap();
            core.queue.push_back(item);
            self.take_loop_slot(&mut core)
        };
        if spawn {
            if report_started {
                self.enqueuer.processing_started();
            }
            self.spawn_drain();
        }
    }

    /// The no-op-if-already-running guard; callers must hold the core lock.
    fn take_loop_slot(&self, core: &mut EngineCore<P>) -> bool {
        if core.state != DrainState::Idle || core.destroyed || self.is_stopped() {
            return false;
        }
        core.state = DrainState::Running;
        true
    }

    fn spawn_drain(self: &Arc<Self>) {
        let me = Arc::clone(self);
        tokio::spawn(async move { me.drain().await });
    }

    /// Pops the head item, or `None`, the sole exit condition of the run.
    fn dequeue(&self) -> Option<WorkItem<P>> {
        if self.is_stopped() {
            return None;
        }
        self.core.lock().unwrap().queue.pop_front()
    }

    /// The drain task: process items until the queue is empty, then
    /// finalize (restarting once for items that raced in).
    async fn drain(self: Arc<Self>) {
        self.bus.publish(Event::now(EventKind::DrainStarted));
        debug!("drain loop started");

        loop {
            let end = self.run_once().await;

            let notify_finished = {
                let mut core = self.core.lock().unwrap();
                match end {
                    // Race window: an admit may have appended between our
                    // final dequeue and this lock; go around again.
                    RunEnd::Drained if !core.queue.is_empty() && !self.is_stopped() => {
                        continue;
                    }
                    _ => {}
                }
                core.state = DrainState::Idle;
                !core.destroyed && !self.is_stopped()
            };

            self.bus.publish(Event::now(EventKind::DrainFinished));
            debug!("drain loop finished");
            if notify_finished {
                self.enqueuer.processing_finished();
            }
            return;
        }
    }

    /// One processing run: dequeue and handle until empty, stopped, or a
    /// handler failure.
    async fn run_once(&self) -> RunEnd {
        while let Some(item) = self.dequeue() {
            let (id, payload) = item.into_parts();
            debug!(%id, "processing next item");
            self.bus
                .publish(Event::now(EventKind::WorkStarted).with_id(id.clone()));

            let interruptible = self.interrupt_if_stopped.load(Ordering::SeqCst);
            let outcome = if interruptible {
                tokio::select! {
                    res = self.handler.handle(payload, self.stop_token.child_token()) => Some(res),
                    _ = self.stop_token.cancelled() => None,
                }
            } else {
                Some(
                    self.handler
                        .handle(payload, self.stop_token.child_token())
                        .await,
                )
            };

            // Completion bookkeeping runs on every path, including the
            // interrupted one (best-effort) and the failed one: the item
            // left the queue and is no longer in flight.
            self.enqueuer.ack(&id);
            self.bus
                .publish(Event::now(EventKind::WorkCompleted).with_id(id.clone()));

            match outcome {
                None => {
                    debug!(%id, "handler interrupted by stop request");
                    return RunEnd::Stopped;
                }
                Some(Err(e)) => {
                    warn!(%id, error = %e, label = e.as_label(), "work handler failed");
                    self.bus.publish(
                        Event::now(EventKind::WorkFailed)
                            .with_id(id)
                            .with_error(e.to_string()),
                    );
                    return RunEnd::Failed;
                }
                Some(Ok(())) => {}
            }

            if self.is_stopped() {
                return RunEnd::Stopped;
            }
        }

        if self.is_stopped() {
            RunEnd::Stopped
        } else {
            RunEnd::Drained
        }
    }
}
