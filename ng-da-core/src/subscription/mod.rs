//! Fan-out from items to subscribers and the topic registrar.

mod item_source;
mod manager;
mod registry;

pub use item_source::{FanOutReport, ItemSubscriptionSource};
pub use manager::{NGSubscriptionManager, SubscriptionState};
pub use registry::{BindingSlot, RegistrySnapshot, SubscriptionRegistry};
