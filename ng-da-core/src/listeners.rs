//! Copy-on-write listener storage and per-listener fault isolation.
//!
//! Mutation swaps in a new immutable vector; dispatch loads the current
//! vector once and iterates it without holding any lock. A listener added or
//! removed while a dispatch is running therefore only affects later
//! dispatches, and a slow listener never stalls registration.
//!
//! A set can be closed once; a closed set stays empty and refuses additions.

use arc_swap::ArcSwap;
use ng_da_error::{DaError, DaResult};
use serde::Serialize;
use std::{
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use tracing::warn;

/// Handle returned on registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct ListenerEntry<T: ?Sized> {
    pub id: ListenerId,
    pub listener: Arc<T>,
}

impl<T: ?Sized> Clone for ListenerEntry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            listener: Arc::clone(&self.listener),
        }
    }
}

/// Point-in-time view of a [`ListenerSet`].
pub type ListenerSnapshot<T> = Arc<Vec<ListenerEntry<T>>>;

pub struct ListenerSet<T: ?Sized> {
    next_id: AtomicU64,
    closed: AtomicBool,
    entries: ArcSwap<Vec<ListenerEntry<T>>>,
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            entries: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Register `listener`; `None` once the set is closed.
    pub fn add(&self, listener: Arc<T>) -> Option<ListenerId> {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = ListenerEntry { id, listener };
        let mut added = false;
        // checked on every attempt; a close in between forces a retry
        self.entries.rcu(|current| {
            added = !self.closed.load(Ordering::SeqCst);
            if !added {
                return Arc::clone(current);
            }
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(entry.clone());
            Arc::new(next)
        });
        added.then_some(id)
    }

    /// Returns true when `id` was registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let previous = self.entries.rcu(|current| {
            current
                .iter()
                .filter(|e| e.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        previous.iter().any(|e| e.id == id)
    }

    pub fn clear(&self) {
        self.entries.store(Arc::new(Vec::new()));
    }

    /// Drop every listener and refuse later additions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.entries.store(Arc::new(Vec::new()));
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn snapshot(&self) -> ListenerSnapshot<T> {
        self.entries.load_full()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }
}

/// An isolated fault raised by one listener during delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerFailure {
    pub listener_id: Option<ListenerId>,
    pub error: DaError,
}

/// Structured per-listener result of one dispatch or fan-out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failures: Vec<ListenerFailure>,
}

impl DeliveryReport {
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    #[inline]
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }

    pub(crate) fn record(&mut self, listener_id: Option<ListenerId>, result: DaResult<()>) {
        match result {
            Ok(()) => self.delivered += 1,
            Err(error) => self.failures.push(ListenerFailure { listener_id, error }),
        }
    }

    pub(crate) fn merge(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.failures.extend(other.failures);
    }
}

/// Invoke `f`, turning both an `Err` and a panic into a `ListenerFailure` error.
pub(crate) fn isolate<F>(listener: &str, f: F) -> DaResult<()>
where
    F: FnOnce() -> DaResult<()>,
{
    let result = match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(DaError::ListenerFailure { listener, reason })) => {
            DaError::ListenerFailure { listener, reason }
        }
        Ok(Err(e)) => DaError::listener_failure(listener, e.to_string()),
        Err(panic) => {
            let reason = if let Some(s) = panic.downcast_ref::<&str>() {
                format!("panicked: {s}")
            } else if let Some(s) = panic.downcast_ref::<String>() {
                format!("panicked: {s}")
            } else {
                "panicked".to_string()
            };
            DaError::listener_failure(listener, reason)
        }
    };
    warn!(listener, error = %result, "Listener fault isolated");
    Err(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove() {
        let set: ListenerSet<str> = ListenerSet::new();
        let a = set.add(Arc::from("a")).unwrap();
        let b = set.add(Arc::from("b")).unwrap();
        assert_ne!(a, b);
        assert_eq!(set.len(), 2);
        assert!(set.remove(a));
        assert!(!set.remove(a));
        let names: Vec<String> = set.snapshot().iter().map(|e| e.listener.to_string()).collect();
        assert_eq!(names, vec!["b".to_string()]);
    }

    #[test]
    fn test_snapshot_is_stable_across_mutation() {
        let set: ListenerSet<str> = ListenerSet::new();
        set.add(Arc::from("a"));
        let snap = set.snapshot();
        set.add(Arc::from("b"));
        set.clear();
        assert_eq!(snap.len(), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_closed_set_refuses_additions() {
        let set: ListenerSet<str> = ListenerSet::new();
        set.add(Arc::from("a"));
        set.close();
        assert!(set.is_closed());
        assert!(set.is_empty());
        assert_eq!(set.add(Arc::from("b")), None);
        assert!(set.is_empty());
    }

    #[test]
    fn test_isolate_catches_panic_and_err() {
        let r = isolate("p", || panic!("boom"));
        assert_eq!(
            r,
            Err(DaError::listener_failure("p", "panicked: boom"))
        );

        let r = isolate("e", || Err(DaError::NullValue));
        assert_eq!(r, Err(DaError::listener_failure("e", "null value")));

        assert!(isolate("ok", || Ok(())).is_ok());
    }

    #[test]
    fn test_report_counts() {
        let mut report = DeliveryReport::default();
        report.record(None, Ok(()));
        report.record(None, Err(DaError::NullValue));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.attempted(), 2);
        assert!(!report.is_clean());
    }
}
