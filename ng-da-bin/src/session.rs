use ng_da_error::DaResult;
use ng_da_sdk::{AttributeSnapshot, ItemListener, Subscriber, Variant};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::info;

/// Subscriber writing every notification to the log.
pub struct LoggingSubscriber {
    id: String,
    received: AtomicU64,
}

impl LoggingSubscriber {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            received: AtomicU64::new(0),
        })
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl ItemListener for LoggingSubscriber {
    fn name(&self) -> &str {
        &self.id
    }

    fn notify_value(&self, item_id: &str, value: &Variant) -> DaResult<()> {
        self.received.fetch_add(1, Ordering::Relaxed);
        info!(subscriber = %self.id, item = item_id, %value, "Value changed");
        Ok(())
    }

    fn notify_attributes(&self, item_id: &str, attributes: &AttributeSnapshot) -> DaResult<()> {
        self.received.fetch_add(1, Ordering::Relaxed);
        let attributes = serde_json::to_string(attributes)?;
        info!(subscriber = %self.id, item = item_id, %attributes, "Attributes changed");
        Ok(())
    }
}

impl Subscriber for LoggingSubscriber {
    fn subscriber_id(&self) -> &str {
        &self.id
    }
}
