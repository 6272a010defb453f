//! # Elastic bounded worker pool.
//!
//! Backing executor for [`DispatchPolicy::Pooled`](crate::DispatchPolicy::Pooled).
//! The backlog is unbounded: jobs queue and are never dropped. Workers
//! grow on demand up to a cap and shrink back to a resident floor after
//! sitting idle.
//!
//! ## Rules
//! - A submission with no idle worker spawns a new one, up to the cap.
//! - A worker that times out idle exits only while the pool is above the
//!   resident floor and the backlog is still empty.
//! - `shutdown()` discards the backlog and retires every worker at its
//!   next safe point.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::work::DispatchJob;

/// What ended one idle wait.
enum IdleOutcome {
    Woken,
    TimedOut,
    Retired,
}

struct PoolInner {
    backlog: Mutex<VecDeque<DispatchJob>>,
    wakeup: Notify,
    workers: AtomicUsize,
    idle: AtomicUsize,
    resident: usize,
    max: usize,
    idle_timeout: Duration,
    retire: CancellationToken,
}

/// Bounded worker pool with an unbounded backlog.
pub(crate) struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    pub(crate) fn new(resident: usize, max: usize, idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                backlog: Mutex::new(VecDeque::new()),
                wakeup: Notify::new(),
                workers: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
                resident,
                max: max.max(resident).max(1),
                idle_timeout,
                retire: CancellationToken::new(),
            }),
        }
    }

    /// Queues a job and makes sure a worker will pick it up.
    pub(crate) fn submit(&self, job: DispatchJob) {
        let inner = &self.inner;
        if inner.retire.is_cancelled() {
            warn!("pool is shut down; discarding job");
            return;
        }
        inner.backlog.lock().unwrap().push_back(job);
        if inner.idle.load(Ordering::SeqCst) == 0 {
            self.spawn_worker_if_below_cap();
        }
        // Stored permit: an idle worker picks this up even if it registers
        // its wait after we notify.
        inner.wakeup.notify_one();
    }

    /// Discards the backlog and retires all workers.
    pub(crate) fn shutdown(&self) {
        self.inner.retire.cancel();
        self.inner.backlog.lock().unwrap().clear();
        self.inner.wakeup.notify_waiters();
    }

    /// Current number of live workers.
    #[cfg(test)]
    pub(crate) fn worker_count(&self) -> usize {
        self.inner.workers.load(Ordering::SeqCst)
    }

    fn spawn_worker_if_below_cap(&self) {
        let inner = &self.inner;
        let mut count = inner.workers.load(Ordering::SeqCst);
        loop {
            if count >= inner.max {
                return;
            }
            match inner.workers.compare_exchange(
                count,
                count + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(observed) => count = observed,
            }
        }
        debug!(workers = count + 1, "spawning pool worker");
        tokio::spawn(Self::worker(Arc::clone(inner)));
    }

    async fn worker(inner: Arc<PoolInner>) {
        loop {
            // Drain whatever is queued, one job at a time.
            loop {
                if inner.retire.is_cancelled() {
                    inner.workers.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
                let job = inner.backlog.lock().unwrap().pop_front();
                match job {
                    Some(job) => job.await,
                    None => break,
                }
            }

            // Nothing queued: wait for work, a timeout, or retirement.
            inner.idle.fetch_add(1, Ordering::SeqCst);
            let outcome = tokio::select! {
                _ = inner.wakeup.notified() => IdleOutcome::Woken,
                _ = tokio::time::sleep(inner.idle_timeout) => IdleOutcome::TimedOut,
                _ = inner.retire.cancelled() => IdleOutcome::Retired,
            };
            inner.idle.fetch_sub(1, Ordering::SeqCst);

            match outcome {
                IdleOutcome::Woken => {}
                IdleOutcome::Retired => {
                    inner.workers.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
                IdleOutcome::TimedOut => {
                    // The backlog re-check runs after the idle count drops,
                    // so a submit that saw this worker as idle either left
                    // a job we will observe here or spawns a replacement.
                    if inner.backlog.lock().unwrap().is_empty()
                        && Self::try_retire_surplus(&inner)
                    {
                        debug!("surplus pool worker retired after idle timeout");
                        return;
                    }
                }
            }
        }
    }

    /// Decrements the worker count only while it stays above the resident
    /// floor. Atomic so concurrent timeouts cannot retire the floor itself.
    fn try_retire_surplus(inner: &PoolInner) -> bool {
        let mut count = inner.workers.load(Ordering::SeqCst);
        loop {
            if count <= inner.resident {
                return false;
            }
            match inner.workers.compare_exchange(
                count,
                count - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => count = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;
    use tokio::sync::Notify as TestNotify;

    fn counting_job(
        running: Arc<AtomicI64>,
        peak: Arc<AtomicI64>,
        release: Arc<TestNotify>,
    ) -> DispatchJob {
        Box::pin(async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            release.notified().await;
            running.fetch_sub(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn grows_to_run_jobs_concurrently() {
        let pool = WorkerPool::new(1, 8, Duration::from_secs(30));
        let running = Arc::new(AtomicI64::new(0));
        let peak = Arc::new(AtomicI64::new(0));
        let release = Arc::new(TestNotify::new());

        for _ in 0..3 {
            pool.submit(counting_job(
                Arc::clone(&running),
                Arc::clone(&peak),
                Arc::clone(&release),
            ));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(running.load(Ordering::SeqCst), 3, "jobs should run concurrently");

        release.notify_waiters();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(running.load(Ordering::SeqCst), 0);
        assert!(peak.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_the_worker_cap() {
        let pool = WorkerPool::new(1, 2, Duration::from_secs(30));
        let running = Arc::new(AtomicI64::new(0));
        let peak = Arc::new(AtomicI64::new(0));
        let release = Arc::new(TestNotify::new());

        for _ in 0..6 {
            pool.submit(counting_job(
                Arc::clone(&running),
                Arc::clone(&peak),
                Arc::clone(&release),
            ));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(pool.worker_count() <= 2);
        assert!(peak.load(Ordering::SeqCst) <= 2);

        // Release everything; the backlog must fully drain (never dropped).
        for _ in 0..12 {
            release.notify_waiters();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shrinks_back_to_the_resident_floor() {
        let pool = WorkerPool::new(1, 4, Duration::from_millis(50));
        let release = Arc::new(TestNotify::new());
        let running = Arc::new(AtomicI64::new(0));
        let peak = Arc::new(AtomicI64::new(0));

        for _ in 0..4 {
            pool.submit(counting_job(
                Arc::clone(&running),
                Arc::clone(&peak),
                Arc::clone(&release),
            ));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        release.notify_waiters();

        // Surplus workers idle out; the resident worker stays.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(pool.worker_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_discards_backlog() {
        let pool = WorkerPool::new(1, 1, Duration::from_secs(30));
        let release = Arc::new(TestNotify::new());
        let running = Arc::new(AtomicI64::new(0));
        let peak = Arc::new(AtomicI64::new(0));

        pool.submit(counting_job(
            Arc::clone(&running),
            Arc::clone(&peak),
            Arc::clone(&release),
        ));
        let ran = Arc::new(AtomicI64::new(0));
        let ran2 = Arc::clone(&ran);
        pool.submit(Box::pin(async move {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.shutdown();
        release.notify_waiters();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(ran.load(Ordering::SeqCst), 0, "queued job must be discarded");
        pool.submit(Box::pin(async {}));
    }
}
