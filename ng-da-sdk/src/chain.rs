use crate::{AttributeSnapshot, Variant};
use ng_da_error::{DaError, DaResult};

/// One transformation step of an item's processing chain.
///
/// `process` consumes the working value and attribute snapshot produced by the
/// previous entry and returns the input for the next one. Snapshots are
/// immutable, so an entry can only ever change what the *pass* sees, never
/// what is currently published.
pub trait ChainProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, value: Variant, attributes: AttributeSnapshot) -> (Variant, AttributeSnapshot);

    /// True when this processor owns the writable attribute `key`.
    fn handles_attribute(&self, _key: &str) -> bool {
        false
    }

    /// Apply a subscriber write to an owned attribute.
    fn write_attribute(&self, key: &str, _value: &Variant) -> DaResult<()> {
        Err(DaError::invalid_operation(format!(
            "attribute '{key}' is not handled by {}",
            self.name()
        )))
    }
}
