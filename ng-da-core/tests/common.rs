#![allow(dead_code)]

use ng_da_core::chain::processors::FnProcessor;
use ng_da_sdk::{
    AttributeSnapshot, ChainProcessor, DaError, DaResult, ItemListener, Subscriber,
    SubscriptionBinding, Variant,
};
use std::sync::{Arc, Mutex, Once};
use tracing::Level;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

/// One notification observed by a recording sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Value(Variant),
    Attributes(AttributeSnapshot),
}

/// Sink / subscriber that records every notification in order.
#[derive(Default)]
pub struct Recorder {
    id: String,
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn values(&self) -> Vec<Variant> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Value(v) => Some(v),
                Event::Attributes(_) => None,
            })
            .collect()
    }

    pub fn attributes(&self) -> Vec<AttributeSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Attributes(a) => Some(a),
                Event::Value(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl ItemListener for Recorder {
    fn name(&self) -> &str {
        &self.id
    }

    fn notify_value(&self, _item_id: &str, value: &Variant) -> DaResult<()> {
        self.events.lock().unwrap().push(Event::Value(value.clone()));
        Ok(())
    }

    fn notify_attributes(&self, _item_id: &str, attributes: &AttributeSnapshot) -> DaResult<()> {
        self.events
            .lock()
            .unwrap()
            .push(Event::Attributes(attributes.clone()));
        Ok(())
    }
}

impl Subscriber for Recorder {
    fn subscriber_id(&self) -> &str {
        &self.id
    }
}

/// Subscriber that fails every notification, by error or by panic.
pub struct Faulty {
    id: String,
    panics: bool,
}

impl Faulty {
    pub fn erroring(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            panics: false,
        })
    }

    pub fn panicking(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            panics: true,
        })
    }

    fn fail(&self) -> DaResult<()> {
        if self.panics {
            panic!("subscriber {} crashed", self.id);
        }
        Err(DaError::from("session closed"))
    }
}

impl ItemListener for Faulty {
    fn name(&self) -> &str {
        &self.id
    }

    fn notify_value(&self, _item_id: &str, _value: &Variant) -> DaResult<()> {
        self.fail()
    }

    fn notify_attributes(&self, _item_id: &str, _attributes: &AttributeSnapshot) -> DaResult<()> {
        self.fail()
    }
}

impl Subscriber for Faulty {
    fn subscriber_id(&self) -> &str {
        &self.id
    }
}

pub fn bind(topic: &str, subscriber: Arc<dyn Subscriber>) -> SubscriptionBinding {
    SubscriptionBinding::new(topic, subscriber)
}

/// Read-direction entry doubling integer values.
pub fn doubler() -> Arc<dyn ChainProcessor> {
    Arc::new(FnProcessor::new("double", |v: Variant, a| match v.as_i64() {
        Ok(n) => (Variant::Int64(n * 2), a),
        Err(_) => (v, a),
    }))
}
