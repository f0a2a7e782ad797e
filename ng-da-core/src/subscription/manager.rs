use dashmap::DashMap;
use ng_da_error::{DaError, DaResult};
use ng_da_sdk::{SubscriptionBinding, SubscriptionSource};
use serde::Serialize;
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, info, warn};

/// Where a binding ended up after [`NGSubscriptionManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Registered with the topic's source.
    Bound,
    /// Parked until a source for the topic appears.
    Pending,
}

#[derive(Default)]
struct TopicEntry {
    source: Option<Arc<dyn SubscriptionSource>>,
    bound: HashSet<SubscriptionBinding>,
    pending: HashSet<SubscriptionBinding>,
}

/// Registrar connecting subscribers to sources by topic.
///
/// Subscribers may arrive before their source exists; such bindings wait in
/// a pending set and are bound in one bulk call once the source is set.
/// Each topic is guarded by its own mutex, held while the source is called;
/// a subscriber must not call back into the manager for the same topic from
/// inside a notification.
#[derive(Default)]
pub struct NGSubscriptionManager {
    topics: DashMap<Arc<str>, Arc<Mutex<TopicEntry>>>,
}

fn lock(entry: &Mutex<TopicEntry>) -> MutexGuard<'_, TopicEntry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NGSubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, topic: &str) -> Arc<Mutex<TopicEntry>> {
        if let Some(entry) = self.topics.get(topic) {
            return Arc::clone(entry.value());
        }
        Arc::clone(
            self.topics
                .entry(Arc::from(topic))
                .or_default()
                .value(),
        )
    }

    fn existing(&self, topic: &str) -> Option<Arc<Mutex<TopicEntry>>> {
        self.topics.get(topic).map(|e| Arc::clone(e.value()))
    }

    fn inspect<T>(&self, topic: &str, f: impl FnOnce(&TopicEntry) -> T) -> Option<T> {
        let entry = self.existing(topic)?;
        let state = lock(&entry);
        Some(f(&state))
    }

    pub fn subscribe(&self, binding: SubscriptionBinding) -> DaResult<SubscriptionState> {
        let entry = self.entry(binding.topic());
        let mut topic = lock(&entry);
        if topic.bound.contains(&binding) {
            return Ok(SubscriptionState::Bound);
        }
        let Some(source) = topic.source.clone() else {
            debug!(?binding, "No source for topic, binding parked");
            topic.pending.insert(binding);
            return Ok(SubscriptionState::Pending);
        };
        if !source.supports_listener(&binding) {
            return Err(DaError::UnsupportedBinding(format!("{binding:?}")));
        }
        source.add_listener(std::slice::from_ref(&binding))?;
        debug!(?binding, "Binding bound");
        topic.bound.insert(binding);
        Ok(SubscriptionState::Bound)
    }

    /// Returns whether the binding was known, bound or pending.
    pub fn unsubscribe(&self, binding: &SubscriptionBinding) -> bool {
        let Some(entry) = self.existing(binding.topic()) else {
            return false;
        };
        let mut topic = lock(&entry);
        if topic.bound.remove(binding) {
            if let Some(source) = &topic.source {
                source.remove_listener(std::slice::from_ref(binding));
            }
            debug!(?binding, "Binding unbound");
            return true;
        }
        topic.pending.remove(binding)
    }

    /// Install `source` for `topic`, replacing any previous one.
    ///
    /// Bindings of a replaced source are moved over together with the pending
    /// ones. Returns the bindings the new source does not support; they stay
    /// pending.
    pub fn set_source(
        &self,
        topic: &str,
        source: Arc<dyn SubscriptionSource>,
    ) -> DaResult<Vec<SubscriptionBinding>> {
        let entry = self.entry(topic);
        let mut state = lock(&entry);
        if let Some(previous) = state.source.take() {
            let bound: Vec<_> = state.bound.drain().collect();
            previous.remove_listener(&bound);
            state.pending.extend(bound);
        }
        state.source = Some(Arc::clone(&source));

        let (supported, unsupported): (Vec<_>, Vec<_>) = state
            .pending
            .iter()
            .cloned()
            .partition(|b| source.supports_listener(b));
        if !supported.is_empty() {
            source.add_listener(&supported)?;
            for binding in supported.iter() {
                state.pending.remove(binding);
            }
            state.bound.extend(supported.iter().cloned());
        }
        if !unsupported.is_empty() {
            warn!(topic, count = unsupported.len(), "Source rejects pending bindings");
        }
        info!(topic, bound = supported.len(), "Source registered");
        Ok(unsupported)
    }

    /// Remove the source for `topic`; its bindings are parked again.
    pub fn remove_source(&self, topic: &str) -> Option<Arc<dyn SubscriptionSource>> {
        let entry = self.existing(topic)?;
        let mut state = lock(&entry);
        let source = state.source.take()?;
        let bound: Vec<_> = state.bound.drain().collect();
        source.remove_listener(&bound);
        info!(topic, parked = bound.len(), "Source removed");
        state.pending.extend(bound);
        Some(source)
    }

    pub fn has_source(&self, topic: &str) -> bool {
        self.inspect(topic, |state| state.source.is_some())
            .unwrap_or(false)
    }

    pub fn state_of(&self, binding: &SubscriptionBinding) -> Option<SubscriptionState> {
        self.inspect(binding.topic(), |state| {
            if state.bound.contains(binding) {
                Some(SubscriptionState::Bound)
            } else if state.pending.contains(binding) {
                Some(SubscriptionState::Pending)
            } else {
                None
            }
        })
        .flatten()
    }

    pub fn bound_count(&self, topic: &str) -> usize {
        self.inspect(topic, |state| state.bound.len()).unwrap_or(0)
    }

    pub fn pending_count(&self, topic: &str) -> usize {
        self.inspect(topic, |state| state.pending.len()).unwrap_or(0)
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.iter().map(|e| e.key().to_string()).collect();
        topics.sort();
        topics
    }
}
