use crate::listeners::isolate;
use arc_swap::ArcSwap;
use ng_da_error::DaResult;
use ng_da_sdk::{AttributeSnapshot, SubscriptionBinding, Variant};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

/// Per-binding delivery position.
///
/// Sequence numbers are assigned by the publishing source; a slot only
/// forwards an event newer than the last one it forwarded, so a late replay
/// racing with a live notification can neither duplicate nor reorder state.
#[derive(Debug, Default)]
struct DeliveryCursor {
    value_seq: u64,
    attributes_seq: u64,
}

pub struct BindingSlot {
    binding: SubscriptionBinding,
    cursor: Mutex<DeliveryCursor>,
}

impl BindingSlot {
    fn new(binding: SubscriptionBinding) -> Self {
        Self {
            binding,
            cursor: Mutex::new(DeliveryCursor::default()),
        }
    }

    #[inline]
    pub fn binding(&self) -> &SubscriptionBinding {
        &self.binding
    }

    /// Returns `None` when the event is not newer than what was delivered.
    pub(crate) fn deliver_value(
        &self,
        seq: u64,
        item_id: &str,
        value: &Variant,
    ) -> Option<DaResult<()>> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        if seq <= cursor.value_seq {
            return None;
        }
        cursor.value_seq = seq;
        let subscriber = self.binding.subscriber();
        Some(isolate(subscriber.name(), || {
            subscriber.notify_value(item_id, value)
        }))
    }

    pub(crate) fn deliver_attributes(
        &self,
        seq: u64,
        item_id: &str,
        attributes: &AttributeSnapshot,
    ) -> Option<DaResult<()>> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        if seq <= cursor.attributes_seq {
            return None;
        }
        cursor.attributes_seq = seq;
        let subscriber = self.binding.subscriber();
        Some(isolate(subscriber.name(), || {
            subscriber.notify_attributes(item_id, attributes)
        }))
    }
}

pub type RegistrySnapshot = Arc<HashMap<SubscriptionBinding, Arc<BindingSlot>>>;

/// Set of registered bindings with copy-on-write snapshots for fan-out.
///
/// Writers are serialized by a short mutex that only guards building the
/// next map; fan-out loads the current map and never takes that mutex.
pub struct SubscriptionRegistry {
    bindings: ArcSwap<HashMap<SubscriptionBinding, Arc<BindingSlot>>>,
    write_lock: Mutex<()>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            bindings: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Register `bindings`; returns the slots of those not registered before.
    pub fn add_all(&self, bindings: &[SubscriptionBinding]) -> Vec<Arc<BindingSlot>> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.bindings.load_full();
        let mut next: Option<HashMap<_, _>> = None;
        let mut added = Vec::new();
        for binding in bindings {
            let map = next.as_ref().unwrap_or(current.as_ref());
            if map.contains_key(binding) {
                continue;
            }
            let slot = Arc::new(BindingSlot::new(binding.clone()));
            next.get_or_insert_with(|| current.as_ref().clone())
                .insert(binding.clone(), Arc::clone(&slot));
            added.push(slot);
        }
        if let Some(next) = next {
            self.bindings.store(Arc::new(next));
        }
        added
    }

    /// Deregister `bindings`; returns those that were registered.
    pub fn remove_all(&self, bindings: &[SubscriptionBinding]) -> Vec<SubscriptionBinding> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.bindings.load_full();
        if !bindings.iter().any(|b| current.contains_key(b)) {
            return Vec::new();
        }
        let mut next = current.as_ref().clone();
        let removed = bindings
            .iter()
            .filter_map(|b| next.remove_entry(b).map(|(binding, _)| binding))
            .collect();
        self.bindings.store(Arc::new(next));
        removed
    }

    pub fn clear(&self) -> Vec<SubscriptionBinding> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self.bindings.swap(Arc::new(HashMap::new()));
        previous.keys().cloned().collect()
    }

    #[inline]
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.bindings.load_full()
    }

    #[inline]
    pub fn contains(&self, binding: &SubscriptionBinding) -> bool {
        self.bindings.load().contains_key(binding)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.load().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.load().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ng_da_sdk::{ItemListener, Subscriber};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        id: String,
        values: AtomicUsize,
    }

    impl ItemListener for Counting {
        fn notify_value(&self, _: &str, _: &Variant) -> DaResult<()> {
            self.values.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn notify_attributes(&self, _: &str, _: &AttributeSnapshot) -> DaResult<()> {
            Ok(())
        }
    }

    impl Subscriber for Counting {
        fn subscriber_id(&self) -> &str {
            &self.id
        }
    }

    fn binding(topic: &str, id: &str) -> SubscriptionBinding {
        SubscriptionBinding::new(
            topic,
            Arc::new(Counting {
                id: id.to_string(),
                ..Default::default()
            }),
        )
    }

    #[test]
    fn test_add_is_set_idempotent() {
        let registry = SubscriptionRegistry::new();
        let a = binding("t", "a");
        let added = registry.add_all(&[a.clone(), a.clone(), binding("t", "b")]);
        assert_eq!(added.len(), 2);
        assert!(registry.add_all(&[binding("t", "a")]).is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let registry = SubscriptionRegistry::new();
        registry.add_all(&[binding("t", "a")]);
        let before = registry.snapshot();
        assert!(registry.remove_all(&[binding("t", "zzz")]).is_empty());
        assert!(Arc::ptr_eq(&before, &registry.snapshot()));
        assert_eq!(registry.remove_all(&[binding("t", "a")]).len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_slot_skips_stale_events() {
        let registry = SubscriptionRegistry::new();
        let slot = registry.add_all(&[binding("t", "a")]).remove(0);
        assert!(slot.deliver_value(2, "t", &Variant::Int32(2)).is_some());
        assert!(slot.deliver_value(1, "t", &Variant::Int32(1)).is_none());
        assert!(slot.deliver_value(2, "t", &Variant::Int32(2)).is_none());
        assert!(slot.deliver_value(3, "t", &Variant::Int32(3)).is_some());
    }
}
