//! # Work identity and the admitted unit of work.
//!
//! [`WorkId`] is the opaque, process-unique token the external signal
//! source attaches to each start signal. The runtime only ever compares,
//! hashes, and prints it; ids are never reused while outstanding.
//!
//! [`WorkItem<P>`] pairs an id with an opaque payload. The payload type is
//! a parameter the runtime never inspects; how it crosses process
//! boundaries is the host's concern.

use std::fmt;
use std::sync::Arc;

/// Opaque process-unique token identifying one admission.
///
/// Constructible from integers or strings; cheap to clone.
///
/// # Example
/// ```
/// use worklatch::WorkId;
///
/// let a = WorkId::from(42u64);
/// let b = WorkId::from("42");
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "42");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct WorkId(Arc<str>);

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkId({})", self.0)
    }
}

impl From<&str> for WorkId {
    fn from(s: &str) -> Self {
        WorkId(Arc::from(s))
    }
}

impl From<String> for WorkId {
    fn from(s: String) -> Self {
        WorkId(Arc::from(s.as_str()))
    }
}

impl From<u64> for WorkId {
    fn from(n: u64) -> Self {
        WorkId(Arc::from(n.to_string().as_str()))
    }
}

impl From<i32> for WorkId {
    fn from(n: i32) -> Self {
        WorkId(Arc::from(n.to_string().as_str()))
    }
}

/// One accepted unit of work: an id plus an opaque payload.
#[derive(Clone, Debug)]
pub struct WorkItem<P> {
    id: WorkId,
    payload: P,
}

impl<P> WorkItem<P> {
    /// Creates a new work item.
    pub fn new(id: impl Into<WorkId>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Returns the admission id.
    pub fn id(&self) -> &WorkId {
        &self.id
    }

    /// Returns a reference to the payload.
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Splits the item into its id and payload.
    pub fn into_parts(self) -> (WorkId, P) {
        (self.id, self.payload)
    }
}

/// Directive returned to the host after every admission: whether to request
/// redelivery of the signal if the component is killed before completion.
///
/// This design always answers [`RedeliverPolicy::Redeliver`]: pending work
/// must survive the component being reclaimed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedeliverPolicy {
    /// Ask the host to redeliver the signal after an untimely death.
    Redeliver,
    /// Let the signal be forgotten if the component dies.
    Forget,
}
