mod handler;
mod item;

pub use handler::{DirectHandler, DispatchJob, DispatchPolicy, WorkHandler};
pub use item::{RedeliverPolicy, WorkId, WorkItem};
