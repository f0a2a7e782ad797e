//! The data item: primary state, processing chain and published state.
//!
//! Every mutation of an item (field update, chain reconfiguration, attribute
//! write, sink replacement) runs under the item's own mutex, so passes on one
//! item are strictly serialized and notifications leave in acceptance order.
//! Readers of the published state never take that mutex; they load the
//! current [`Published`] snapshot through an `ArcSwap`.

use crate::{
    chain::{run_chain, ChainEntry, ChainEntryId},
    command::{CommandDispatcher, DispatchReport},
    listeners::{isolate, ListenerId},
    metrics::ItemMetrics,
};
use arc_swap::ArcSwap;
use ng_da_error::{DaError, DaResult};
use ng_da_sdk::{
    reject_all_attributes, AttributeMap, AttributeMode, AttributeSnapshot, ChainProcessor,
    CommandListener, IODirection, IODirections, ItemKind, ItemListener, Variant, VariantType,
    WriteAttributeResults,
};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use tracing::{debug, info, instrument};

/// Static description of an item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemDescriptor {
    pub id: Arc<str>,
    pub kind: ItemKind,
    /// Type written values are coerced into before dispatch.
    pub declared_type: Option<VariantType>,
    /// Whether `set_value(Null)` is accepted.
    pub accept_null: bool,
}

impl ItemDescriptor {
    pub fn new(id: impl Into<Arc<str>>, kind: ItemKind) -> Self {
        Self {
            id: id.into(),
            kind,
            declared_type: None,
            accept_null: false,
        }
    }

    pub fn with_declared_type(mut self, declared_type: Option<VariantType>) -> Self {
        self.declared_type = declared_type;
        self
    }

    pub fn with_accept_null(mut self, accept_null: bool) -> Self {
        self.accept_null = accept_null;
        self
    }
}

/// Secondary state as seen by readers.
#[derive(Debug, Clone, Default)]
struct Published {
    /// `None` until the first pass completed.
    value: Option<Variant>,
    attributes: AttributeSnapshot,
}

struct ItemState {
    primary_value: Variant,
    primary_attributes: AttributeSnapshot,
    chain: Vec<ChainEntry>,
    listener: Option<Arc<dyn ItemListener>>,
    /// Attributes most recently delivered to the current sink.
    sink_attributes: AttributeSnapshot,
    disposed: bool,
}

pub struct DataItem {
    descriptor: ItemDescriptor,
    state: Mutex<ItemState>,
    published: ArcSwap<Published>,
    dispatcher: CommandDispatcher,
    metrics: ItemMetrics,
    next_entry_id: AtomicU64,
}

impl DataItem {
    pub fn new(descriptor: ItemDescriptor) -> Self {
        let dispatcher = CommandDispatcher::new(Arc::clone(&descriptor.id));
        Self {
            descriptor,
            state: Mutex::new(ItemState {
                primary_value: Variant::Null,
                primary_attributes: AttributeSnapshot::empty(),
                chain: Vec::new(),
                listener: None,
                sink_attributes: AttributeSnapshot::empty(),
                disposed: false,
            }),
            published: ArcSwap::from_pointee(Published::default()),
            dispatcher,
            metrics: ItemMetrics::default(),
            next_entry_id: AtomicU64::new(1),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    #[inline]
    pub fn kind(&self) -> ItemKind {
        self.descriptor.kind
    }

    #[inline]
    pub fn descriptor(&self) -> &ItemDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn metrics(&self) -> &ItemMetrics {
        &self.metrics
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, ItemState> {
        // a panicking chain processor must not wedge the item
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_active(&self, state: &ItemState) -> DaResult<()> {
        if state.disposed {
            return Err(DaError::invalid_operation(format!(
                "item '{}' is disposed",
                self.descriptor.id
            )));
        }
        Ok(())
    }

    /// Accept a new raw field value.
    ///
    /// A value equal to the current primary value is ignored. Otherwise one
    /// read pass runs before this returns.
    pub fn update_value(&self, value: Variant) -> DaResult<()> {
        self.update_data(Some(value), &AttributeMap::new(), AttributeMode::Update)
    }

    /// Accept a new raw value and/or primary attribute changes.
    ///
    /// `None` keeps the current primary value. One pass runs if either the
    /// value or the resulting primary attributes changed.
    #[instrument(level = "trace", skip_all, fields(item = %self.descriptor.id))]
    pub fn update_data(
        &self,
        value: Option<Variant>,
        attributes: &AttributeMap,
        mode: AttributeMode,
    ) -> DaResult<()> {
        if !self.descriptor.kind.is_readable() {
            return Err(DaError::invalid_operation(format!(
                "item '{}' ({}) does not accept field updates",
                self.descriptor.id, self.descriptor.kind
            )));
        }
        let mut state = self.lock();
        self.ensure_active(&state)?;

        let value_changed = match value {
            Some(v) if v != state.primary_value => {
                state.primary_value = v;
                true
            }
            _ => false,
        };
        let attributes_changed = if attributes.is_empty() && mode == AttributeMode::Update {
            false
        } else {
            let merged = state.primary_attributes.merge(attributes, mode);
            let changed = merged != state.primary_attributes;
            state.primary_attributes = merged;
            changed
        };

        let accepted = value_changed || attributes_changed;
        self.metrics.record_update(accepted);
        if accepted {
            self.run_pass(&mut state);
        }
        Ok(())
    }

    /// Run the read chain over the primary state and publish the result.
    fn run_pass(&self, state: &mut ItemState) {
        let (value, attributes) = run_chain(
            &state.chain,
            IODirection::Input,
            state.primary_value.clone(),
            state.primary_attributes.clone(),
        );
        self.metrics.record_pass();

        let previous = self.published.load_full();
        // the first pass has nothing to compare against
        let value_changed = previous.value.as_ref() != Some(&value);
        let value = match (&previous.value, value_changed) {
            (Some(prev), false) => prev.clone(),
            _ => value,
        };
        self.published.store(Arc::new(Published {
            value: Some(value.clone()),
            attributes: attributes.clone(),
        }));
        debug!(
            item = %self.descriptor.id,
            %value,
            value_changed,
            attributes = attributes.len(),
            "Pass completed"
        );

        let Some(listener) = state.listener.clone() else {
            return;
        };
        if value_changed {
            self.deliver_value(&listener, &value);
        }
        if attributes != state.sink_attributes {
            self.deliver_attributes(&listener, &attributes);
            state.sink_attributes = attributes;
        }
    }

    fn deliver_value(&self, listener: &Arc<dyn ItemListener>, value: &Variant) {
        self.metrics.record_value_notification();
        let result = isolate(listener.name(), || {
            listener.notify_value(&self.descriptor.id, value)
        });
        if result.is_err() {
            self.metrics.record_failures(1);
        }
    }

    fn deliver_attributes(&self, listener: &Arc<dyn ItemListener>, attributes: &AttributeSnapshot) {
        self.metrics.record_attribute_notification();
        let result = isolate(listener.name(), || {
            listener.notify_attributes(&self.descriptor.id, attributes)
        });
        if result.is_err() {
            self.metrics.record_failures(1);
        }
    }

    /// Replace the notification sink.
    ///
    /// A new sink synchronously receives the current value (when non-null)
    /// and attributes (when non-empty) before any later live notification.
    pub fn set_listener(&self, listener: Option<Arc<dyn ItemListener>>) -> DaResult<()> {
        let Some(listener) = listener else {
            self.detach_listener();
            return Ok(());
        };
        let mut state = self.lock();
        self.ensure_active(&state)?;
        state.listener = Some(Arc::clone(&listener));
        state.sink_attributes = AttributeSnapshot::empty();
        debug!(item = %self.descriptor.id, sink = listener.name(), "Sink attached");
        let published = self.published.load_full();
        if let Some(value) = published.value.as_ref().filter(|v| !v.is_null()) {
            self.deliver_value(&listener, value);
        }
        if !published.attributes.is_empty() {
            self.deliver_attributes(&listener, &published.attributes);
            state.sink_attributes = published.attributes.clone();
        }
        Ok(())
    }

    /// Remove the notification sink. Allowed on disposed items.
    pub fn detach_listener(&self) {
        let mut state = self.lock();
        if state.listener.take().is_some() {
            debug!(item = %self.descriptor.id, "Sink detached");
        }
        state.sink_attributes = AttributeSnapshot::empty();
    }

    pub fn has_listener(&self) -> bool {
        self.lock().listener.is_some()
    }

    /// Current secondary value; `Null` before the first pass.
    pub fn get_value(&self) -> DaResult<Variant> {
        if !self.descriptor.kind.is_readable() {
            return Err(DaError::invalid_operation(format!(
                "item '{}' ({}) cannot be read",
                self.descriptor.id, self.descriptor.kind
            )));
        }
        Ok(self.published.load().value.clone().unwrap_or_default())
    }

    /// Current secondary attributes. Always empty for command items.
    pub fn get_attributes(&self) -> AttributeSnapshot {
        self.published.load().attributes.clone()
    }

    /// Primary (pre-chain) value.
    pub fn primary_value(&self) -> Variant {
        self.lock().primary_value.clone()
    }

    /// Write a value toward the device side.
    ///
    /// Contract violations (direction, null, conversion) fail synchronously.
    /// Listener faults never fail the call; they are reported per listener.
    #[instrument(level = "trace", skip_all, fields(item = %self.descriptor.id))]
    pub fn set_value(&self, value: Variant) -> DaResult<DispatchReport> {
        if !self.descriptor.kind.is_writable() {
            return Err(DaError::invalid_operation(format!(
                "item '{}' ({}) is not writable",
                self.descriptor.id, self.descriptor.kind
            )));
        }
        if value.is_null() && !self.descriptor.accept_null {
            return Err(DaError::NullValue);
        }
        let value = match self.descriptor.declared_type {
            Some(target) if !value.is_null() => value.coerce(target)?,
            _ => value,
        };

        let outgoing = {
            let state = self.lock();
            self.ensure_active(&state)?;
            if self.descriptor.kind == ItemKind::Chained {
                run_chain(
                    &state.chain,
                    IODirection::Output,
                    value,
                    AttributeSnapshot::empty(),
                )
                .0
            } else {
                value
            }
        };

        let report = self.dispatcher.dispatch(&outgoing);
        self.metrics.record_dispatch();
        self.metrics.record_failures(report.failures.len());
        Ok(report)
    }

    /// Offer attribute writes to the chain processors.
    ///
    /// Each key goes to the first processor that owns it. Keys nobody owns
    /// fail individually. A read pass re-runs if any key was accepted.
    pub fn set_attributes(&self, attributes: &AttributeMap) -> WriteAttributeResults {
        if self.descriptor.kind == ItemKind::Command {
            return reject_all_attributes(attributes);
        }
        let mut state = self.lock();
        if let Err(e) = self.ensure_active(&state) {
            return attributes
                .keys()
                .map(|key| (key.clone(), Err(e.clone())))
                .collect();
        }

        let mut results = WriteAttributeResults::new();
        let mut accepted = false;
        for (key, value) in attributes {
            let result = match state
                .chain
                .iter()
                .find(|entry| entry.processor.handles_attribute(key))
            {
                Some(entry) => entry.processor.write_attribute(key, value),
                None => Err(DaError::invalid_operation(format!(
                    "attribute '{key}' is not handled"
                ))),
            };
            accepted |= result.is_ok();
            results.insert(key.clone(), result);
        }
        if accepted {
            self.rerun_if_published(&mut state);
        }
        results
    }

    /// Re-run the read pass after a reconfiguration, but only once the item
    /// has published something.
    fn rerun_if_published(&self, state: &mut ItemState) {
        if self.descriptor.kind.is_readable() && self.published.load().value.is_some() {
            self.run_pass(state);
        }
    }

    /// Append a chain entry.
    pub fn add_chain_entry(
        &self,
        scope: IODirections,
        processor: Arc<dyn ChainProcessor>,
    ) -> DaResult<ChainEntryId> {
        let mut state = self.lock();
        self.ensure_active(&state)?;
        let id = ChainEntryId(self.next_entry_id.fetch_add(1, Ordering::Relaxed));
        debug!(
            item = %self.descriptor.id,
            entry = %id,
            processor = processor.name(),
            ?scope,
            "Chain entry added"
        );
        state.chain.push(ChainEntry {
            id,
            scope,
            processor,
        });
        self.rerun_if_published(&mut state);
        Ok(id)
    }

    /// Returns whether the entry existed.
    pub fn remove_chain_entry(&self, id: ChainEntryId) -> DaResult<bool> {
        let mut state = self.lock();
        self.ensure_active(&state)?;
        let before = state.chain.len();
        state.chain.retain(|entry| entry.id != id);
        let removed = state.chain.len() != before;
        if removed {
            debug!(item = %self.descriptor.id, entry = %id, "Chain entry removed");
            self.rerun_if_published(&mut state);
        }
        Ok(removed)
    }

    pub fn clear_chain(&self) -> DaResult<()> {
        let mut state = self.lock();
        self.ensure_active(&state)?;
        if state.chain.is_empty() {
            return Ok(());
        }
        state.chain.clear();
        self.rerun_if_published(&mut state);
        Ok(())
    }

    pub fn chain_entries(&self) -> Vec<ChainEntry> {
        self.lock().chain.clone()
    }

    pub fn add_command_listener(&self, listener: Arc<dyn CommandListener>) -> DaResult<ListenerId> {
        if !self.descriptor.kind.is_writable() {
            return Err(DaError::invalid_operation(format!(
                "item '{}' ({}) does not dispatch commands",
                self.descriptor.id, self.descriptor.kind
            )));
        }
        // never takes the item lock; a closed dispatcher marks a disposed item
        self.dispatcher.add_listener(listener)
    }

    pub fn remove_command_listener(&self, id: ListenerId) -> bool {
        self.dispatcher.remove_listener(id)
    }

    #[inline]
    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Detach the sink, release chain entries and command listeners.
    pub fn deactivate(&self) {
        let mut state = self.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.listener = None;
        state.chain.clear();
        self.dispatcher.close();
        info!(item = %self.descriptor.id, "Item deactivated");
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }
}
