use crate::{
    chain::build_chain,
    item::{DataItem, ItemDescriptor},
    subscription::{ItemSubscriptionSource, NGSubscriptionManager},
};
use dashmap::{mapref::entry::Entry, DashMap};
use ng_da_error::{DaError, DaResult};
use ng_da_sdk::{ChainProcessor, IODirections, ItemConfig, ItemKind, SubscriptionSource, VariantType};
use std::sync::Arc;
use tracing::{debug, info};

struct RegisteredItem {
    item: Arc<DataItem>,
    source: Option<Arc<ItemSubscriptionSource>>,
}

/// Creates and owns items under a dotted base id.
///
/// With a subscription manager, every created item is published as a source
/// under its own id, so bindings parked for that id are bound immediately.
pub struct NGItemFactory {
    base_id: Arc<str>,
    items: DashMap<Arc<str>, RegisteredItem>,
    children: DashMap<String, Arc<NGItemFactory>>,
    manager: Option<Arc<NGSubscriptionManager>>,
}

impl NGItemFactory {
    pub fn new(base_id: impl Into<Arc<str>>, manager: Option<Arc<NGSubscriptionManager>>) -> Self {
        Self {
            base_id: base_id.into(),
            items: DashMap::new(),
            children: DashMap::new(),
            manager,
        }
    }

    #[inline]
    pub fn base_id(&self) -> &str {
        &self.base_id
    }

    /// Full id of the item `name` in this factory.
    pub fn item_id(&self, name: &str) -> String {
        if self.base_id.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.base_id, name)
        }
    }

    pub fn create_input(&self, name: &str) -> DaResult<Arc<DataItem>> {
        self.create(
            ItemDescriptor::new(self.item_id(name), ItemKind::ReadOnly),
            Vec::new(),
        )
    }

    pub fn create_output(
        &self,
        name: &str,
        declared_type: Option<VariantType>,
    ) -> DaResult<Arc<DataItem>> {
        self.create(
            ItemDescriptor::new(self.item_id(name), ItemKind::WriteOnly)
                .with_declared_type(declared_type),
            Vec::new(),
        )
    }

    pub fn create_input_output(
        &self,
        name: &str,
        declared_type: Option<VariantType>,
    ) -> DaResult<Arc<DataItem>> {
        self.create(
            ItemDescriptor::new(self.item_id(name), ItemKind::Chained)
                .with_declared_type(declared_type),
            Vec::new(),
        )
    }

    /// Command items accept a null write; a trigger carries no payload.
    pub fn create_command(&self, name: &str) -> DaResult<Arc<DataItem>> {
        self.create(
            ItemDescriptor::new(self.item_id(name), ItemKind::Command).with_accept_null(true),
            Vec::new(),
        )
    }

    pub fn create_from_config(&self, config: &ItemConfig) -> DaResult<Arc<DataItem>> {
        let descriptor = ItemDescriptor::new(self.item_id(&config.name), config.kind)
            .with_declared_type(config.declared_type)
            .with_accept_null(
                config
                    .accept_null
                    .unwrap_or(config.kind == ItemKind::Command),
            );
        self.create(descriptor, build_chain(&config.chain))
    }

    fn create(
        &self,
        descriptor: ItemDescriptor,
        chain: Vec<(IODirections, Arc<dyn ChainProcessor>)>,
    ) -> DaResult<Arc<DataItem>> {
        let id = Arc::clone(&descriptor.id);
        let item = match self.items.entry(Arc::clone(&id)) {
            Entry::Occupied(_) => {
                return Err(DaError::invalid_operation(format!(
                    "item '{id}' already exists"
                )))
            }
            Entry::Vacant(slot) => {
                let item = Arc::new(DataItem::new(descriptor));
                for (scope, processor) in chain {
                    item.add_chain_entry(scope, processor)?;
                }
                slot.insert(RegisteredItem {
                    item: Arc::clone(&item),
                    source: None,
                });
                item
            }
        };

        if let Some(manager) = &self.manager {
            let source = ItemSubscriptionSource::attach(&item)?;
            if let Some(mut registered) = self.items.get_mut(&id) {
                registered.source = Some(Arc::clone(&source));
            }
            manager.set_source(&id, source as Arc<dyn SubscriptionSource>)?;
        }
        debug!(item = %id, kind = %item.kind(), "Item created");
        Ok(item)
    }

    /// Factory for `base.name`, created on first use.
    pub fn sub_factory(&self, name: &str) -> Arc<NGItemFactory> {
        let base_id = self.item_id(name);
        let manager = self.manager.clone();
        Arc::clone(
            self.children
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(NGItemFactory::new(base_id, manager)))
                .value(),
        )
    }

    pub fn item(&self, id: &str) -> Option<Arc<DataItem>> {
        self.items.get(id).map(|r| Arc::clone(&r.item))
    }

    pub fn source(&self, id: &str) -> Option<Arc<ItemSubscriptionSource>> {
        self.items.get(id).and_then(|r| r.source.clone())
    }

    /// Ids of the items created directly by this factory, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.items.iter().map(|r| r.key().to_string()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Dispose a single item. Returns whether it existed.
    pub fn remove_item(&self, id: &str) -> bool {
        match self.items.remove(id) {
            Some((id, registered)) => {
                self.release(&id, registered);
                true
            }
            None => false,
        }
    }

    fn release(&self, id: &str, registered: RegisteredItem) {
        if let Some(manager) = &self.manager {
            manager.remove_source(id);
        }
        if let Some(source) = registered.source {
            source.detach();
        }
        registered.item.deactivate();
    }

    /// Dispose every item, including those of sub-factories.
    pub fn dispose(&self) {
        let children: Vec<Arc<NGItemFactory>> =
            self.children.iter().map(|c| Arc::clone(c.value())).collect();
        self.children.clear();
        for child in children {
            child.dispose();
        }

        let ids: Vec<Arc<str>> = self.items.iter().map(|r| Arc::clone(r.key())).collect();
        let count = ids.len();
        for id in ids {
            if let Some((id, registered)) = self.items.remove(&id) {
                self.release(&id, registered);
            }
        }
        info!(base = %self.base_id, items = count, "Item factory disposed");
    }
}
