use anyhow::Error as AnyhowError;
use config::ConfigError;
use serde_json::Error as SerdeJsonError;
use std::{error::Error as StdError, io::Error as IoError};
use thiserror::Error;
use tokio::task::JoinError;

pub type DaResult<T, E = DaError> = anyhow::Result<T, E>;

/// Errors raised by the data-access core and its collaborators.
///
/// The first four variants form the published item contract:
/// `InvalidOperation`, `NullValue` and `NotConvertible` are returned
/// synchronously from `set_value`/`update_value`, while `ListenerFailure`
/// only ever describes an isolated fault inside a sink or listener and is
/// reported through dispatch/fan-out reports, never to the value source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DaError {
    /// Operation not permitted for the item's declared direction.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// A required value is absent.
    #[error("null value")]
    NullValue,
    /// Value present but cannot be coerced into the target type.
    #[error("value not convertible: {0}")]
    NotConvertible(String),
    /// Isolated fault inside a notification or command listener.
    #[error("listener '{listener}' failed: {reason}")]
    ListenerFailure { listener: String, reason: String },
    /// Subscription binding rejected by the source's validation predicate.
    #[error("unsupported subscription binding: {0}")]
    UnsupportedBinding(String),
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    #[error("initialization error: {0}")]
    InitializationError(String),
    #[error("{0}")]
    Msg(String),
}

impl DaError {
    #[inline]
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        DaError::InvalidOperation(msg.into())
    }

    #[inline]
    pub fn listener_failure(listener: impl Into<String>, reason: impl Into<String>) -> Self {
        DaError::ListenerFailure {
            listener: listener.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for the contract violations a write target may raise.
    #[inline]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            DaError::InvalidOperation(_) | DaError::NullValue | DaError::NotConvertible(_)
        )
    }
}

impl From<String> for DaError {
    #[inline]
    fn from(e: String) -> Self {
        DaError::Msg(e)
    }
}

impl From<&str> for DaError {
    #[inline]
    fn from(e: &str) -> Self {
        DaError::Msg(e.to_string())
    }
}

impl From<ConfigError> for DaError {
    #[inline]
    fn from(e: ConfigError) -> Self {
        DaError::ConfigurationError(e.to_string())
    }
}

impl From<IoError> for DaError {
    #[inline]
    fn from(e: IoError) -> Self {
        DaError::Msg(e.to_string())
    }
}

impl From<SerdeJsonError> for DaError {
    #[inline]
    fn from(e: SerdeJsonError) -> Self {
        DaError::ConfigurationError(e.to_string())
    }
}

impl From<JoinError> for DaError {
    #[inline]
    fn from(e: JoinError) -> Self {
        DaError::Msg(e.to_string())
    }
}

impl From<AnyhowError> for DaError {
    #[inline]
    fn from(e: AnyhowError) -> Self {
        DaError::Msg(e.to_string())
    }
}

impl From<Box<dyn StdError + Send + Sync>> for DaError {
    #[inline]
    fn from(e: Box<dyn StdError + Send + Sync>) -> Self {
        DaError::Msg(e.to_string())
    }
}
