pub mod chain;
pub mod command;
pub mod factory;
pub mod item;
pub mod listeners;
pub mod metrics;
pub mod subscription;

// Re-export commonly used types
pub use chain::{build_chain, build_processor, run_chain, ChainEntry, ChainEntryId};
pub use command::{CommandDispatcher, DispatchReport};
pub use factory::NGItemFactory;
pub use item::{DataItem, ItemDescriptor};
pub use listeners::{DeliveryReport, ListenerFailure, ListenerId, ListenerSet};
pub use metrics::{ItemMetrics, ItemMetricsSnapshot};
pub use subscription::{
    FanOutReport, ItemSubscriptionSource, NGSubscriptionManager, SubscriptionRegistry,
    SubscriptionState,
};
