mod attributes;
mod chain;
mod config;
mod listener;
mod subscription;
mod types;
mod value;

pub use ng_da_error::{DaError, DaResult};

pub use attributes::{
    reject_all_attributes, AttributeMap, AttributeMode, AttributeSnapshot, WriteAttributeResults,
};
pub use chain::ChainProcessor;
pub use config::{ChainEntryConfig, ItemConfig, ProcessorConfig};
pub use listener::{CommandListener, FnCommandListener, ItemListener};
pub use subscription::{Subscriber, SubscriptionBinding, SubscriptionSource};
pub use types::{IODirection, IODirections, ItemKind};
pub use value::{Variant, VariantCastError, VariantType};
