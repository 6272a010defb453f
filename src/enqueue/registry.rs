//! # Process-wide enqueuer registry.
//!
//! One [`Enqueuer`] exists per component class for the process lifetime;
//! this registry is where that at-most-once guarantee lives. It is an
//! explicit, injectable object rather than ambient global state: hosts
//! hold one in their process context, tests construct their own.
//!
//! ## Rules
//! - Creation is at-most-once per key, under a single lock.
//! - Entries are never removed; enqueuer state (leases, job ids) must
//!   outlive any single life episode of the component.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::enqueue::{Enqueuer, JobId};
use crate::work::WorkItem;

/// Identifies a component class, the unit enqueuers are cached per.
///
/// # Example
/// ```
/// use worklatch::ComponentKey;
///
/// let key = ComponentKey::from("com.example.SyncWorker");
/// assert_eq!(key.to_string(), "com.example.SyncWorker");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ComponentKey(Arc<str>);

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentKey({})", self.0)
    }
}

impl From<&str> for ComponentKey {
    fn from(s: &str) -> Self {
        ComponentKey(Arc::from(s))
    }
}

impl From<String> for ComponentKey {
    fn from(s: String) -> Self {
        ComponentKey(Arc::from(s.as_str()))
    }
}

/// Injectable cache of one enqueuer per component class.
pub struct EnqueuerRegistry<P> {
    entries: Mutex<HashMap<ComponentKey, Arc<dyn Enqueuer<P>>>>,
}

impl<P: Send + 'static> EnqueuerRegistry<P> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the enqueuer for `key`, building it with `make` if this is
    /// the first lookup. `make` runs under the registry lock, so it is
    /// called at most once per key for the life of the process.
    pub fn obtain(
        &self,
        key: &ComponentKey,
        make: impl FnOnce() -> Arc<dyn Enqueuer<P>>,
    ) -> Arc<dyn Enqueuer<P>> {
        let mut entries = self.entries.lock().unwrap();
        entries
            .entry(key.clone())
            .or_insert_with(make)
            .clone()
    }

    /// Routes one admission to a component class: obtains (or builds) the
    /// enqueuer, pins the job id, and enqueues the item.
    ///
    /// # Panics
    /// If `job_id` differs from the id already fixed for this class.
    pub fn enqueue_work(
        &self,
        key: &ComponentKey,
        job_id: JobId,
        item: WorkItem<P>,
        make: impl FnOnce() -> Arc<dyn Enqueuer<P>>,
    ) {
        let enqueuer = self.obtain(key, make);
        enqueuer.ensure_job_id(job_id);
        enqueuer.enqueue(item);
    }
}

impl<P: Send + 'static> Default for EnqueuerRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::work::WorkId;

    #[derive(Default)]
    struct CountingEnqueuer {
        enqueued: AtomicUsize,
        last_job_id: Mutex<Option<JobId>>,
    }

    impl Enqueuer<u32> for CountingEnqueuer {
        fn ensure_job_id(&self, job_id: JobId) {
            let mut last = self.last_job_id.lock().unwrap();
            match *last {
                None => *last = Some(job_id),
                Some(existing) if existing == job_id => {}
                Some(existing) => {
                    panic!("given job id {job_id} is different than previous {existing}")
                }
            }
        }

        fn enqueue(&self, _item: WorkItem<u32>) {
            self.enqueued.fetch_add(1, Ordering::SeqCst);
        }

        fn ack(&self, _id: &WorkId) {}
    }

    #[test]
    fn factory_runs_at_most_once_per_key() {
        let registry: EnqueuerRegistry<u32> = EnqueuerRegistry::new();
        let key = ComponentKey::from("worker");
        let built = AtomicUsize::new(0);

        let first = registry.obtain(&key, || {
            built.fetch_add(1, Ordering::SeqCst);
            Arc::new(CountingEnqueuer::default())
        });
        let second = registry.obtain(&key, || {
            built.fetch_add(1, Ordering::SeqCst);
            Arc::new(CountingEnqueuer::default())
        });

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn distinct_keys_get_distinct_enqueuers() {
        let registry: EnqueuerRegistry<u32> = EnqueuerRegistry::new();
        let a = registry.obtain(&ComponentKey::from("a"), || {
            Arc::new(CountingEnqueuer::default())
        });
        let b = registry.obtain(&ComponentKey::from("b"), || {
            Arc::new(CountingEnqueuer::default())
        });
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn enqueue_work_pins_the_job_id_and_routes_the_item() {
        let registry: EnqueuerRegistry<u32> = EnqueuerRegistry::new();
        let key = ComponentKey::from("worker");
        let inner = Arc::new(CountingEnqueuer::default());

        let handle = inner.clone();
        registry.enqueue_work(&key, JobId(5), WorkItem::new(1u64, 0), move || handle);
        let handle = inner.clone();
        registry.enqueue_work(&key, JobId(5), WorkItem::new(2u64, 0), move || handle);

        assert_eq!(inner.enqueued.load(Ordering::SeqCst), 2);
        assert_eq!(*inner.last_job_id.lock().unwrap(), Some(JobId(5)));
    }

    #[test]
    #[should_panic(expected = "different than previous")]
    fn mismatched_job_id_across_admissions_is_fatal() {
        let registry: EnqueuerRegistry<u32> = EnqueuerRegistry::new();
        let key = ComponentKey::from("worker");
        let inner = Arc::new(CountingEnqueuer::default());

        let handle = inner.clone();
        registry.enqueue_work(&key, JobId(5), WorkItem::new(1u64, 0), move || handle);
        let handle = inner.clone();
        registry.enqueue_work(&key, JobId(7), WorkItem::new(2u64, 0), move || handle);
    }
}
