//! # Host handler traits and the per-admission dispatch policy.
//!
//! Two handler shapes, one per architecture:
//! - [`DirectHandler`] — consumed by the direct tracker; classifies each
//!   admission into a [`DispatchPolicy`] and handles it under that policy.
//! - [`WorkHandler`] — consumed by the sequential drain engine; handles
//!   items strictly in arrival order and receives a cancellation token to
//!   observe stop requests cooperatively.
//!
//! ## Rules
//! - The policy set is closed: exhaustive matches over [`DispatchPolicy`]
//!   are part of the correctness story, so the enum is not `non_exhaustive`.
//! - Handlers may be slow; they run off the admitting call except under
//!   [`DispatchPolicy::Inline`].

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;
use crate::work::item::WorkId;

/// A dispatch-ready unit of work: the handler invocation plus its
/// completion bookkeeping, boxed for hand-off to an executor.
pub type DispatchJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// How one admission is executed by the direct tracker.
///
/// Decided once per admission by [`DirectHandler::classify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchPolicy {
    /// Run synchronously on the admitting call; completed on return.
    ///
    /// Use for work cheap enough to finish inside signal delivery.
    Inline,

    /// Marshal onto a single always-ordered executor; completed after
    /// the handler returns.
    ///
    /// Use when admissions of this kind must never run concurrently.
    Serial,

    /// Run on the bounded built-in worker pool (unbounded backlog);
    /// completed after the handler returns.
    ///
    /// Use for independent, potentially slow work.
    Pooled,

    /// The handler only kicks the work off; the host completes the
    /// admission later through a [`Completer`](crate::Completer), arbitrarily
    /// far in the future.
    External,
}

/// # Handler for direct-dispatch admissions.
///
/// Implemented by the host. `classify` picks the policy; `handle` does the
/// work. Under every policy except [`DispatchPolicy::External`], the
/// tracker completes the admission as soon as `handle` returns; a handler
/// error is surfaced on the event bus but still counts as "handled".
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use worklatch::{DirectHandler, DispatchPolicy, HandlerError, WorkId};
///
/// struct Echo;
///
/// #[async_trait]
/// impl DirectHandler<String> for Echo {
///     fn classify(&self, payload: &String) -> DispatchPolicy {
///         if payload.starts_with("ui:") { DispatchPolicy::Serial } else { DispatchPolicy::Pooled }
///     }
///
///     async fn handle(
///         &self,
///         payload: String,
///         _policy: DispatchPolicy,
///         _id: WorkId,
///     ) -> Result<(), HandlerError> {
///         println!("{payload}");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait DirectHandler<P>: Send + Sync + 'static {
    /// Chooses the dispatch policy for one admission. Called exactly once
    /// per admission, before any dispatch.
    fn classify(&self, payload: &P) -> DispatchPolicy;

    /// Processes one admission under the policy `classify` chose for it.
    async fn handle(
        &self,
        payload: P,
        policy: DispatchPolicy,
        id: WorkId,
    ) -> Result<(), HandlerError>;

    /// Offers a pooled job to a host-owned executor before the built-in
    /// pool is used. Return `Ok(())` after taking responsibility for
    /// running the job to completion; return the job back to decline.
    ///
    /// The default declines.
    fn provide_executor(&self, job: DispatchJob) -> Result<(), DispatchJob> {
        Err(job)
    }
}

/// # Handler for sequentially drained work.
///
/// Implemented by the host and invoked by the drain loop once per item, in
/// strict arrival order. The token is canceled when an external stop is
/// requested; long-running handlers should check it at safe points and
/// return [`HandlerError::Canceled`] to bail out.
#[async_trait]
pub trait WorkHandler<P>: Send + Sync + 'static {
    /// Processes one queued item.
    async fn handle(&self, payload: P, stop: CancellationToken) -> Result<(), HandlerError>;

    /// Called when the external authority stops the component mid-queue.
    /// Return `true` (the default) to ask the host to redeliver the
    /// unfinished work later, `false` to abandon it.
    fn on_stop_requested(&self) -> bool {
        true
    }
}
