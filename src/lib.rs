//! # worklatch
//!
//! **Worklatch** keeps a host-managed background component alive exactly as
//! long as admitted work is outstanding, and no longer.
//!
//! A component receives discrete start signals (payload + unique id) at
//! arbitrary times, must begin processing immediately, may have many
//! signals in flight at once, and must shut down only when every accepted
//! signal has been fully processed and acknowledged. Worklatch is the
//! accept/track/drain state machine in the middle; signal delivery,
//! keep-alive authorities, external schedulers, and the actual shutdown
//! are opaque collaborator traits the host wires in.
//!
//! ## Architecture
//! ### Direct tracker
//! ```text
//!  start signal ──► DirectTracker::on_admit(payload, id)
//!                       │ outstanding set += id
//!                       ▼
//!               DirectHandler::classify(payload)
//!          ┌─────────┬──────────┬──────────┬───────────┐
//!          ▼         ▼          ▼          ▼           │
//!       Inline    Serial     Pooled    External        │
//!      (await)  (ordered    (worker   (host calls      │
//!               executor)    pool)     Completer)      │
//!          └─────────┴──────────┴──────────┴───────────┘
//!                       │ complete(id)
//!                       ▼
//!          outstanding set empty? ──► ShutdownTriggered (once)
//! ```
//!
//! ### Sequential drain engine
//! ```text
//!  EnqueuerRegistry::enqueue_work(key, job_id, item)
//!        │  (per-class Enqueuer: keep-alive leases or external scheduler)
//!        ▼
//!  DrainEngine::admit(item) ──► FIFO queue ──► drain task (at most one)
//!                                                 │ per item, in order:
//!                                                 │  WorkHandler::handle
//!                                                 │  Enqueuer::ack(id)
//!                                                 ▼
//!                                queue empty ──► processing_finished
//! ```
//!
//! ## Features
//! | Area           | Description                                               | Key types / traits                          |
//! |----------------|-----------------------------------------------------------|---------------------------------------------|
//! | **Tracking**   | Outstanding-set bookkeeping with exactly-once shutdown.   | [`DirectTracker`], [`Completer`]            |
//! | **Dispatch**   | Per-admission policy: inline, serial, pooled, external.   | [`DispatchPolicy`], [`DirectHandler`]       |
//! | **Draining**   | FIFO queue with a singleton background drain loop.        | [`DrainEngine`], [`WorkHandler`]            |
//! | **Enqueuers**  | Keep-alive leases or external-scheduler delegation.       | [`Enqueuer`], [`KeepAliveEnqueuer`], [`SchedulerEnqueuer`] |
//! | **Registry**   | At-most-once enqueuer per component class, injectable.    | [`EnqueuerRegistry`], [`ComponentKey`]      |
//! | **Events**     | Broadcast bus with sequence-numbered lifecycle events.    | [`Bus`], [`Event`], [`EventKind`]           |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use worklatch::{
//!     Config, DirectHandler, DirectTracker, DispatchPolicy, HandlerError, WorkId,
//! };
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl DirectHandler<String> for Printer {
//!     fn classify(&self, _payload: &String) -> DispatchPolicy {
//!         DispatchPolicy::Inline
//!     }
//!
//!     async fn handle(
//!         &self,
//!         payload: String,
//!         _policy: DispatchPolicy,
//!         _id: WorkId,
//!     ) -> Result<(), HandlerError> {
//!         println!("{payload}");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let tracker = DirectTracker::new(Arc::new(Printer), Config::default());
//!     let done = tracker.shutdown_token();
//!
//!     tracker.on_admit("hello".to_string(), 1u64).await;
//!
//!     // Inline work completed on return, so the latch is already open.
//!     done.cancelled().await;
//!     tracker.destroy();
//! }
//! ```

mod config;
mod direct;
mod engine;
mod enqueue;
mod error;
mod events;
mod work;

// ---- Public re-exports ----

pub use config::Config;
pub use direct::{Completer, DirectTracker};
pub use engine::{DrainEngine, DrainState};
pub use enqueue::{
    ComponentKey, Enqueuer, EnqueuerRegistry, JobId, JobSpec, KeepAlive, KeepAliveEnqueuer,
    SchedulerEnqueuer, SignalDelivery, WorkScheduler,
};
pub use error::HandlerError;
pub use events::{Bus, Event, EventKind};
pub use work::{
    DirectHandler, DispatchJob, DispatchPolicy, RedeliverPolicy, WorkHandler, WorkId, WorkItem,
};
