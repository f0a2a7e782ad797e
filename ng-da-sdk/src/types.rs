use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt::{self, Display, Formatter};

/// Processing direction of a value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(i16)]
pub enum IODirection {
    /// Field value travelling towards subscribers (read/publish).
    Input = 0,
    /// Subscriber value travelling towards the device (write-back).
    Output = 1,
}

/// A subset of {Input, Output}.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IODirections {
    #[serde(default)]
    pub input: bool,
    #[serde(default)]
    pub output: bool,
}

impl IODirections {
    pub const NONE: Self = Self {
        input: false,
        output: false,
    };
    pub const INPUT: Self = Self {
        input: true,
        output: false,
    };
    pub const OUTPUT: Self = Self {
        input: false,
        output: true,
    };
    pub const BOTH: Self = Self {
        input: true,
        output: true,
    };

    #[inline]
    pub fn contains(&self, direction: IODirection) -> bool {
        match direction {
            IODirection::Input => self.input,
            IODirection::Output => self.output,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.input && !self.output
    }
}

impl From<IODirection> for IODirections {
    fn from(direction: IODirection) -> Self {
        match direction {
            IODirection::Input => Self::INPUT,
            IODirection::Output => Self::OUTPUT,
        }
    }
}

/// Closed set of item behaviours.
///
/// Behaviour dispatches on this tag; there is no per-kind item type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Fed by a driver through `update_value`; writes are rejected.
    ReadOnly,
    /// Write target; writes go to command listeners, nothing is published.
    WriteOnly,
    /// Fed by a driver and writable; writes run the write-back chain first.
    Chained,
    /// Stateless trigger; writes go to command listeners.
    Command,
}

impl ItemKind {
    #[inline]
    pub fn directions(&self) -> IODirections {
        match self {
            ItemKind::ReadOnly => IODirections::INPUT,
            ItemKind::WriteOnly | ItemKind::Command => IODirections::OUTPUT,
            ItemKind::Chained => IODirections::BOTH,
        }
    }

    #[inline]
    pub fn is_readable(&self) -> bool {
        self.directions().input
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.directions().output
    }
}

impl Display for ItemKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemKind::ReadOnly => "read-only",
            ItemKind::WriteOnly => "write-only",
            ItemKind::Chained => "chained",
            ItemKind::Command => "command",
        };
        f.write_str(s)
    }
}
