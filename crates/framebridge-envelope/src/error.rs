/// Errors that can occur while building or parsing envelopes.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The message is not a well-formed envelope.
    #[error("The message format is invalid: {0}")]
    InvalidMessageFormat(String),

    /// An address could not be parsed as a URL.
    #[error("invalid address '{address}': {source}")]
    InvalidAddress {
        address: String,
        source: url::ParseError,
    },
}

pub type Result<T> = std::result::Result<T, EnvelopeError>;
