use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    RwLock,
};

/// Per-item counters with atomic updates.
#[derive(Debug, Default)]
pub struct ItemMetrics {
    /// `update_value` calls that changed the primary value
    pub updates_accepted: AtomicU64,
    /// `update_value` calls ignored because the value was unchanged
    pub updates_ignored: AtomicU64,
    /// Completed read-direction processing passes
    pub passes: AtomicU64,
    pub value_notifications: AtomicU64,
    pub attribute_notifications: AtomicU64,
    /// Values handed to the command dispatcher
    pub commands_dispatched: AtomicU64,
    /// Isolated sink/listener faults
    pub listener_failures: AtomicU64,
    pub last_failure: RwLock<Option<DateTime<Utc>>>,
}

impl ItemMetrics {
    #[inline]
    pub fn record_update(&self, accepted: bool) {
        if accepted {
            self.updates_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.updates_ignored.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_value_notification(&self) {
        self.value_notifications.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_attribute_notification(&self) {
        self.attribute_notifications.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dispatch(&self) {
        self.commands_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failures(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.listener_failures
            .fetch_add(count as u64, Ordering::Relaxed);
        if let Ok(mut last) = self.last_failure.write() {
            *last = Some(Utc::now());
        }
    }

    pub fn snapshot(&self) -> ItemMetricsSnapshot {
        ItemMetricsSnapshot {
            updates_accepted: self.updates_accepted.load(Ordering::Relaxed),
            updates_ignored: self.updates_ignored.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
            value_notifications: self.value_notifications.load(Ordering::Relaxed),
            attribute_notifications: self.attribute_notifications.load(Ordering::Relaxed),
            commands_dispatched: self.commands_dispatched.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
            last_failure: self.last_failure.read().ok().and_then(|g| *g),
        }
    }
}

/// Serializable view of [`ItemMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemMetricsSnapshot {
    pub updates_accepted: u64,
    pub updates_ignored: u64,
    pub passes: u64,
    pub value_notifications: u64,
    pub attribute_notifications: u64,
    pub commands_dispatched: u64,
    pub listener_failures: u64,
    pub last_failure: Option<DateTime<Utc>>,
}
