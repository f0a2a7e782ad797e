//! Subscription control contracts shared with the registrar collaborator.

use crate::ItemListener;
use ng_da_error::DaResult;
use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// A party interested in one or more topics (typically a client session).
pub trait Subscriber: ItemListener {
    /// Stable identity of this subscriber; part of binding equality.
    fn subscriber_id(&self) -> &str;
}

/// Opaque subscriber-to-topic relationship.
///
/// Two bindings are the same binding when they refer to the same topic and
/// the same subscriber id.
#[derive(Clone)]
pub struct SubscriptionBinding {
    topic: Arc<str>,
    subscriber: Arc<dyn Subscriber>,
}

impl SubscriptionBinding {
    pub fn new(topic: impl Into<Arc<str>>, subscriber: Arc<dyn Subscriber>) -> Self {
        Self {
            topic: topic.into(),
            subscriber,
        }
    }

    #[inline]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[inline]
    pub fn subscriber(&self) -> &Arc<dyn Subscriber> {
        &self.subscriber
    }

    #[inline]
    pub fn subscriber_id(&self) -> &str {
        self.subscriber.subscriber_id()
    }
}

impl PartialEq for SubscriptionBinding {
    fn eq(&self, other: &Self) -> bool {
        self.topic == other.topic && self.subscriber_id() == other.subscriber_id()
    }
}

impl Eq for SubscriptionBinding {}

impl Hash for SubscriptionBinding {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.topic.hash(state);
        self.subscriber_id().hash(state);
    }
}

impl fmt::Debug for SubscriptionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionBinding")
            .field("topic", &self.topic)
            .field("subscriber", &self.subscriber_id())
            .finish()
    }
}

/// An event source that can be used with the subscription manager.
pub trait SubscriptionSource: Send + Sync {
    /// Validate whether `binding` can bind to this source. Pure; when this
    /// returns `true`, `add_listener` must not reject the binding.
    fn supports_listener(&self, binding: &SubscriptionBinding) -> bool;

    /// Register a set of bindings as one bulk operation.
    fn add_listener(&self, bindings: &[SubscriptionBinding]) -> DaResult<()>;

    /// Deregister a set of bindings; unknown bindings are ignored.
    fn remove_listener(&self, bindings: &[SubscriptionBinding]);
}
