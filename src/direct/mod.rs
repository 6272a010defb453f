mod pool;
mod serial;
mod tracker;

pub use tracker::{Completer, DirectTracker};

pub(crate) use pool::WorkerPool;
pub(crate) use serial::SerialExecutor;
