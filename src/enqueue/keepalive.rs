//! # Keep-alive enqueuer.
//!
//! For hosts where nothing keeps the process alive between signal delivery
//! and processing: the enqueuer holds explicit keep-alive leases across
//! that window.
//!
//! Two leases, because a time-bounded lease and a long-running lease must
//! not share one handle (changing the timeout on a single lease handle is
//! not reliable on the platforms this models):
//! - the **launch lease** (default 60s) covers the gap between an accepted
//!   delivery and the drain loop picking the work up;
//! - the **processing lease** (default 10min) covers an active drain run.
//!
//! ## Lease state machine
//! ```text
//! enqueue (delivery accepted, not launching, not processing)
//!     └─► launch.acquire(60s)
//! processing_started
//!     └─► processing.acquire(10min); launch.release()
//! processing_finished
//!     ├─ launch requested meanwhile ─► launch.acquire(60s)   (no gap)
//!     └─► processing.release()
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::config::Config;
use crate::enqueue::{Enqueuer, JobId, JobIdCell};
use crate::work::{WorkId, WorkItem};

/// Keep-alive authority the host process manager exposes.
///
/// Acquire/release are idempotent, not stacking: a second `acquire` on a
/// held lease re-arms it, and one `release` fully drops it.
pub trait KeepAlive: Send + Sync + 'static {
    /// Holds the lease for at most `timeout`; `None` holds indefinitely.
    fn acquire(&self, timeout: Option<Duration>);

    /// Drops the lease.
    fn release(&self);
}

/// How start signals reach the component on keep-alive hosts, and how
/// handled signals are retired.
pub trait SignalDelivery<P>: Send + Sync + 'static {
    /// Hands the start signal to the host. Returns false if the host
    /// refused it (a refused delivery must not arm any lease).
    fn deliver(&self, item: WorkItem<P>) -> bool;

    /// Acknowledges a fully-handled signal; the host may retire it.
    fn ack(&self, id: &WorkId);
}

#[derive(Default)]
struct LeaseFlags {
    /// A delivery was accepted and the component has not picked it up yet.
    launching: bool,
    /// A drain run is active and the processing lease is held.
    processing: bool,
}

/// Enqueuer variant backed by explicit keep-alive leases.
pub struct KeepAliveEnqueuer<P> {
    delivery: Arc<dyn SignalDelivery<P>>,
    launch: Arc<dyn KeepAlive>,
    processing: Arc<dyn KeepAlive>,
    launch_lease: Duration,
    processing_lease: Duration,
    job_id: JobIdCell,
    flags: Mutex<LeaseFlags>,
}

impl<P: Send + 'static> KeepAliveEnqueuer<P> {
    /// Creates the enqueuer with lease durations from `cfg`.
    ///
    /// `launch` and `processing` must be distinct lease handles.
    pub fn new(
        delivery: Arc<dyn SignalDelivery<P>>,
        launch: Arc<dyn KeepAlive>,
        processing: Arc<dyn KeepAlive>,
        cfg: &Config,
    ) -> Self {
        Self {
            delivery,
            launch,
            processing,
            launch_lease: cfg.launch_lease,
            processing_lease: cfg.processing_lease,
            job_id: JobIdCell::new(),
            flags: Mutex::new(LeaseFlags::default()),
        }
    }
}

impl<P: Send + 'static> Enqueuer<P> for KeepAliveEnqueuer<P> {
    fn ensure_job_id(&self, job_id: JobId) {
        self.job_id.ensure(job_id);
    }

    fn enqueue(&self, item: WorkItem<P>) {
        let id = item.id().clone();
        if !self.delivery.deliver(item) {
            debug!(%id, "host refused delivery; no lease armed");
            return;
        }
        let mut flags = self.flags.lock().unwrap();
        if !flags.launching {
            flags.launching = true;
            if !flags.processing {
                // Keep the process alive until this delivery is picked up.
                // Time-bounded, in case the pickup never happens.
                self.launch.acquire(Some(self.launch_lease));
            }
        }
    }

    fn ack(&self, id: &WorkId) {
        self.delivery.ack(id);
    }

    fn start_received(&self) {
        // The component saw a start signal: whatever enqueue was last
        // waiting on delivery counts as handed over.
        self.flags.lock().unwrap().launching = false;
    }

    fn processing_started(&self) {
        let mut flags = self.flags.lock().unwrap();
        if !flags.processing {
            flags.processing = true;
            self.processing.acquire(Some(self.processing_lease));
            self.launch.release();
        }
    }

    fn processing_finished(&self) {
        let mut flags = self.flags.lock().unwrap();
        if flags.processing {
            // A delivery landed while we were processing: hand the
            // keep-alive straight back to a launch lease, leaving no gap
            // for the process manager to reclaim us in.
            if flags.launching {
                self.launch.acquire(Some(self.launch_lease));
            }
            flags.processing = false;
            self.processing.release();
        }
    }
}
