use std::sync::Arc;

use framebridge_envelope::EnvelopeError;
use framebridge_transport::TransportError;

/// Errors that can occur in endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Guest address carries no `_origin` parameter.
    #[error("Can't validate origin! Please add ?_origin=PARENT_HOST to the iframe source.")]
    OriginMissing,

    /// Address carries no `_placement` parameter.
    #[error("Can't validate placement! Please add ?_placement=PLACEMENT_NAME to the iframe source.")]
    PlacementMissing,

    /// Host constructed on a frame without an address.
    #[error("No src found. You can't run a host endpoint on an empty frame element.")]
    EmptyFrame,

    /// Frame address could not be parsed.
    #[error("invalid frame address '{address}': {reason}")]
    InvalidFrameAddress { address: String, reason: String },

    /// Host `send` called with a name outside its allow-list.
    #[error("Can't send an undefined event name '{0}'. Make sure you add your event name first.")]
    NotDefinedEventName(String),

    /// The reserved handshake command was used as an application name.
    #[error("The '{0}' command is reserved.")]
    ReservedCommand(String),

    /// Envelope building or parsing failed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A subscriber callback failed.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// Guest window has no parent to talk to.
    #[error("window has no parent frame")]
    NoParent,

    /// The endpoint has been destroyed.
    #[error("endpoint destroyed")]
    Destroyed,

    /// Schema validation error.
    #[cfg(feature = "schema")]
    #[error("schema validation error: {0}")]
    Schema(#[from] framebridge_schema::SchemaError),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failure reported by a subscriber callback.
///
/// Built from a message, or from a [`BridgeError`] raised inside the
/// callback, which stays reachable through [`std::error::Error::source`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Arc<BridgeError>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The endpoint error the callback failed with, if any.
    pub fn bridge_error(&self) -> Option<&BridgeError> {
        self.source.as_deref()
    }
}

impl PartialEq for HandlerError {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
    }
}

impl Eq for HandlerError {}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<BridgeError> for HandlerError {
    fn from(err: BridgeError) -> Self {
        Self {
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

/// Outcome of a subscriber callback.
pub type HandlerResult = std::result::Result<(), HandlerError>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn bridge_error_survives_conversion() {
        let err = HandlerError::from(BridgeError::NotDefinedEventName("notListed".into()));

        assert!(err.message().contains("notListed"));
        assert!(matches!(
            err.bridge_error(),
            Some(BridgeError::NotDefinedEventName(name)) if name == "notListed"
        ));
        let source = err.source().expect("source");
        assert_eq!(source.to_string(), err.message());
    }

    #[test]
    fn message_errors_have_no_source() {
        let err = HandlerError::from("handler exploded");
        assert!(err.source().is_none());
        assert!(err.bridge_error().is_none());
        assert_eq!(err, HandlerError::new("handler exploded"));
    }

    #[test]
    fn wrapped_handler_error_chains_to_its_cause() {
        let inner = HandlerError::from(BridgeError::Destroyed);
        let outer = BridgeError::from(inner);

        let handler = outer.source().expect("handler error");
        assert_eq!(handler.to_string(), "endpoint destroyed");
        let cause = handler.source().expect("bridge error");
        assert_eq!(cause.to_string(), "endpoint destroyed");
    }
}
