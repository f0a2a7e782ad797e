use crate::listeners::{isolate, DeliveryReport, ListenerId, ListenerSet};
use ng_da_error::{DaError, DaResult};
use ng_da_sdk::{CommandListener, Variant};
use std::sync::Arc;
use tracing::debug;

/// Result of one command dispatch.
pub type DispatchReport = DeliveryReport;

/// Delivers written values to every registered [`CommandListener`].
pub struct CommandDispatcher {
    owner: Arc<str>,
    listeners: ListenerSet<dyn CommandListener>,
}

impl CommandDispatcher {
    pub fn new(owner: impl Into<Arc<str>>) -> Self {
        Self {
            owner: owner.into(),
            listeners: ListenerSet::new(),
        }
    }

    /// Fails once the dispatcher is closed.
    pub fn add_listener(&self, listener: Arc<dyn CommandListener>) -> DaResult<ListenerId> {
        let Some(id) = self.listeners.add(listener) else {
            return Err(DaError::invalid_operation(format!(
                "item '{}' is disposed",
                self.owner
            )));
        };
        debug!(item = %self.owner, listener = %id, "Command listener added");
        Ok(id)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(id);
        if removed {
            debug!(item = %self.owner, listener = %id, "Command listener removed");
        }
        removed
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }

    /// Release every listener; later registrations fail.
    pub fn close(&self) {
        self.listeners.close();
        debug!(item = %self.owner, "Command dispatcher closed");
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.listeners.is_closed()
    }

    /// Deliver `value` to the listeners registered at call time.
    ///
    /// A failing listener is recorded in the report and does not prevent
    /// delivery to the rest.
    pub fn dispatch(&self, value: &Variant) -> DispatchReport {
        let snapshot = self.listeners.snapshot();
        let mut report = DispatchReport::default();
        for entry in snapshot.iter() {
            let result = isolate(entry.listener.name(), || entry.listener.command(value));
            report.record(Some(entry.id), result);
        }
        debug!(
            item = %self.owner,
            %value,
            delivered = report.delivered,
            failed = report.failures.len(),
            "Command dispatched"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ng_da_sdk::FnCommandListener;
    use std::sync::Mutex;

    fn recorder(seen: Arc<Mutex<Vec<Variant>>>) -> Arc<dyn CommandListener> {
        Arc::new(FnCommandListener::new("recorder", move |v: &Variant| {
            seen.lock().unwrap().push(v.clone());
            Ok(())
        }))
    }

    #[test]
    fn test_dispatch_isolates_failures() {
        let dispatcher = CommandDispatcher::new("cmd");
        let seen = Arc::new(Mutex::new(Vec::new()));
        dispatcher.add_listener(recorder(seen.clone())).unwrap();
        let bad = dispatcher
            .add_listener(Arc::new(FnCommandListener::new("bad", |_: &Variant| {
                Err(DaError::from("rejected"))
            })))
            .unwrap();
        dispatcher
            .add_listener(Arc::new(FnCommandListener::new("panics", |_: &Variant| {
                panic!("listener bug")
            })))
            .unwrap();
        dispatcher.add_listener(recorder(seen.clone())).unwrap();

        let report = dispatcher.dispatch(&Variant::Int32(1));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].listener_id, Some(bad));
        assert_eq!(*seen.lock().unwrap(), vec![Variant::Int32(1), Variant::Int32(1)]);
    }

    #[test]
    fn test_removed_listener_not_invoked() {
        let dispatcher = CommandDispatcher::new("cmd");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let id = dispatcher.add_listener(recorder(seen.clone())).unwrap();
        assert!(dispatcher.remove_listener(id));
        assert!(!dispatcher.remove_listener(id));
        let report = dispatcher.dispatch(&Variant::Null);
        assert_eq!(report.attempted(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_closed_dispatcher_rejects_listeners() {
        let dispatcher = CommandDispatcher::new("cmd");
        let seen = Arc::new(Mutex::new(Vec::new()));
        dispatcher.add_listener(recorder(seen.clone())).unwrap();
        dispatcher.close();
        assert!(dispatcher.is_closed());
        assert!(dispatcher.is_empty());
        assert!(matches!(
            dispatcher.add_listener(recorder(seen.clone())),
            Err(DaError::InvalidOperation(_))
        ));
        assert_eq!(dispatcher.dispatch(&Variant::Int32(1)).attempted(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }
}
