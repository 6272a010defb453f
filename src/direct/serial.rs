//! # Single-consumer ordered executor.
//!
//! Jobs submitted here run one at a time, in submission order, on a
//! dedicated consumer task. This is the backing for
//! [`DispatchPolicy::Serial`](crate::DispatchPolicy::Serial).
//!
//! Created lazily on first use; [`SerialExecutor::shutdown`] aborts the
//! consumer and discards anything still queued.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::work::DispatchJob;

/// Lazily-created executor that preserves strict submission order.
pub(crate) struct SerialExecutor {
    tx: mpsc::UnboundedSender<DispatchJob>,
    consumer: JoinHandle<()>,
}

impl SerialExecutor {
    /// Spawns the consumer task. Must be called inside a tokio runtime.
    pub(crate) fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<DispatchJob>();
        let consumer = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
            debug!("serial executor drained and closed");
        });
        Self { tx, consumer }
    }

    /// Appends a job; returns false if the executor was already shut down.
    pub(crate) fn submit(&self, job: DispatchJob) -> bool {
        self.tx.send(job).is_ok()
    }

    /// Aborts the consumer, discarding queued jobs.
    pub(crate) fn shutdown(&self) {
        self.consumer.abort();
    }
}
