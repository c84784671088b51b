use crate::traits::WindowId;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No window with this id was ever opened on the bus.
    #[error("unknown window {0}")]
    UnknownWindow(WindowId),

    /// The window has been closed and no longer accepts messages or listeners.
    #[error("window {0} is closed")]
    WindowClosed(WindowId),

    /// The declared target origin is neither `*`, `/` nor a parseable URL.
    #[error("invalid target origin '{0}'")]
    InvalidTargetOrigin(String),

    /// A window location could not be parsed as a URL.
    #[error("invalid address '{address}': {source}")]
    InvalidAddress {
        address: String,
        source: url::ParseError,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
