use super::registry::{BindingSlot, SubscriptionRegistry};
use crate::{item::DataItem, listeners::DeliveryReport};
use arc_swap::ArcSwap;
use ng_da_error::{DaError, DaResult};
use ng_da_sdk::{AttributeSnapshot, ItemListener, SubscriptionBinding, SubscriptionSource, Variant};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Weak,
};
use tracing::{debug, warn};

/// Result of delivering one event to every bound subscriber.
pub type FanOutReport = DeliveryReport;

/// Last state received from the item, tagged with delivery sequence numbers.
#[derive(Debug, Clone, Default)]
struct CachedState {
    value_seq: u64,
    value: Variant,
    attributes_seq: u64,
    attributes: AttributeSnapshot,
}

/// Subscription source publishing one [`DataItem`] to many subscribers.
///
/// The source is the item's notification sink for as long as it is attached.
/// Every event is cached and fanned out to a snapshot of the registry;
/// bindings added later receive the cached state first.
pub struct ItemSubscriptionSource {
    item_id: Arc<str>,
    item: Weak<DataItem>,
    registry: SubscriptionRegistry,
    cache: ArcSwap<CachedState>,
    failures: AtomicU64,
}

impl ItemSubscriptionSource {
    /// Create a source and install it as the item's sink.
    pub fn attach(item: &Arc<DataItem>) -> DaResult<Arc<Self>> {
        let source = Arc::new(Self {
            item_id: Arc::from(item.id()),
            item: Arc::downgrade(item),
            registry: SubscriptionRegistry::new(),
            cache: ArcSwap::from_pointee(CachedState::default()),
            failures: AtomicU64::new(0),
        });
        item.set_listener(Some(Arc::clone(&source) as Arc<dyn ItemListener>))?;
        Ok(source)
    }

    /// Stop receiving item events and drop every binding.
    pub fn detach(&self) -> Vec<SubscriptionBinding> {
        if let Some(item) = self.item.upgrade() {
            item.detach_listener();
        }
        let removed = self.registry.clear();
        debug!(item = %self.item_id, bindings = removed.len(), "Subscription source detached");
        removed
    }

    #[inline]
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    #[inline]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Isolated subscriber faults seen so far.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn fan_out<F>(&self, deliver: F) -> FanOutReport
    where
        F: Fn(&BindingSlot) -> Option<DaResult<()>>,
    {
        let snapshot = self.registry.snapshot();
        let mut report = FanOutReport::default();
        for slot in snapshot.values() {
            if let Some(result) = deliver(slot) {
                report.record(None, result);
            }
        }
        self.account(&report);
        report
    }

    fn account(&self, report: &FanOutReport) {
        if report.is_clean() {
            return;
        }
        self.failures
            .fetch_add(report.failures.len() as u64, Ordering::Relaxed);
        warn!(
            item = %self.item_id,
            failed = report.failures.len(),
            delivered = report.delivered,
            "Fan-out completed with isolated subscriber faults"
        );
    }

    fn replay(&self, slots: &[Arc<BindingSlot>]) {
        let cached = self.cache.load_full();
        let mut report = FanOutReport::default();
        for slot in slots {
            if cached.value_seq > 0 && !cached.value.is_null() {
                if let Some(result) =
                    slot.deliver_value(cached.value_seq, &self.item_id, &cached.value)
                {
                    report.record(None, result);
                }
            }
            if cached.attributes_seq > 0 && !cached.attributes.is_empty() {
                if let Some(result) =
                    slot.deliver_attributes(cached.attributes_seq, &self.item_id, &cached.attributes)
                {
                    report.record(None, result);
                }
            }
        }
        self.account(&report);
    }
}

impl ItemListener for ItemSubscriptionSource {
    fn name(&self) -> &str {
        "item-subscription-source"
    }

    // Called by the item under its own lock, so cache updates are serialized.
    fn notify_value(&self, item_id: &str, value: &Variant) -> DaResult<()> {
        let current = self.cache.load_full();
        let seq = current.value_seq + 1;
        self.cache.store(Arc::new(CachedState {
            value_seq: seq,
            value: value.clone(),
            ..CachedState::clone(&current)
        }));
        self.fan_out(|slot| slot.deliver_value(seq, item_id, value));
        Ok(())
    }

    fn notify_attributes(&self, item_id: &str, attributes: &AttributeSnapshot) -> DaResult<()> {
        let current = self.cache.load_full();
        let seq = current.attributes_seq + 1;
        self.cache.store(Arc::new(CachedState {
            attributes_seq: seq,
            attributes: attributes.clone(),
            ..CachedState::clone(&current)
        }));
        self.fan_out(|slot| slot.deliver_attributes(seq, item_id, attributes));
        Ok(())
    }
}

impl SubscriptionSource for ItemSubscriptionSource {
    fn supports_listener(&self, binding: &SubscriptionBinding) -> bool {
        binding.topic() == &*self.item_id
    }

    fn add_listener(&self, bindings: &[SubscriptionBinding]) -> DaResult<()> {
        if let Some(rejected) = bindings.iter().find(|b| !self.supports_listener(b)) {
            return Err(DaError::UnsupportedBinding(format!(
                "{rejected:?} does not match item '{}'",
                self.item_id
            )));
        }
        let added = self.registry.add_all(bindings);
        debug!(
            item = %self.item_id,
            requested = bindings.len(),
            added = added.len(),
            "Bindings added"
        );
        self.replay(&added);
        Ok(())
    }

    fn remove_listener(&self, bindings: &[SubscriptionBinding]) {
        let removed = self.registry.remove_all(bindings);
        debug!(
            item = %self.item_id,
            requested = bindings.len(),
            removed = removed.len(),
            "Bindings removed"
        );
    }
}
