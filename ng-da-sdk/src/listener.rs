//! Egress contracts: the per-item notification sink and command listeners.

use crate::{AttributeSnapshot, Variant};
use ng_da_error::DaResult;

/// Notification sink attached to a single data item.
///
/// Implemented by the transport/session side. Replay calls made when the sink
/// is attached are identical in shape to live-update calls. Implementations
/// should return quickly and buffer on their own; an `Err` or a panic is
/// contained by the caller and never reaches the value source.
pub trait ItemListener: Send + Sync {
    /// Name used when reporting an isolated fault.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn notify_value(&self, item_id: &str, value: &Variant) -> DaResult<()>;

    fn notify_attributes(&self, item_id: &str, attributes: &AttributeSnapshot) -> DaResult<()>;
}

/// Receiver of values written to a command-capable item.
pub trait CommandListener: Send + Sync {
    /// Name used when reporting an isolated fault.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn command(&self, value: &Variant) -> DaResult<()>;
}

/// Adapter turning a closure into a [`CommandListener`].
pub struct FnCommandListener<F> {
    name: String,
    f: F,
}

impl<F> FnCommandListener<F>
where
    F: Fn(&Variant) -> DaResult<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> CommandListener for FnCommandListener<F>
where
    F: Fn(&Variant) -> DaResult<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn command(&self, value: &Variant) -> DaResult<()> {
        (self.f)(value)
    }
}
