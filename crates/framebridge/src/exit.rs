use std::fmt;

use framebridge_peer::BridgeError;
use framebridge_schema::SchemaError;
use framebridge_transport::TransportError;

// Exit codes follow the sysexits-style table shared by 3leaps CLIs.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::InvalidAddress { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        TransportError::InvalidTargetOrigin(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn schema_error(context: &str, err: SchemaError) -> CliError {
    match err {
        SchemaError::LoadFailed(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn bridge_error(context: &str, err: BridgeError) -> CliError {
    match err {
        BridgeError::Transport(err) => transport_error(context, err),
        BridgeError::Schema(err) => schema_error(context, err),
        BridgeError::OriginMissing
        | BridgeError::PlacementMissing
        | BridgeError::EmptyFrame
        | BridgeError::InvalidFrameAddress { .. }
        | BridgeError::Envelope(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        BridgeError::NotDefinedEventName(_) | BridgeError::ReservedCommand(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        BridgeError::Handler(_) | BridgeError::NoParent => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
