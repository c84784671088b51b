use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{is_reserved, READY_COMMAND};
use crate::error::{EnvelopeError, Result};

/// What a host advertises to its guest during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Event names the host will relay. `None` means unrestricted.
    pub listeners: Option<Vec<String>>,
    /// Command names the guest may invoke on the host.
    pub methods: Vec<String>,
    /// Script tag snippets for the guest to inject.
    pub scripts: Vec<String>,
}

/// Host → guest envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostEnvelope {
    pub command: String,
    pub payload: Value,
    pub placement: String,
    pub available_listeners: Option<Vec<String>>,
    pub available_methods: Option<Vec<String>>,
    pub scripts: Vec<String>,
}

/// Guest → host envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestEnvelope {
    pub command: String,
    pub payload: Value,
    pub placement: String,
}

/// A validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub command: String,
    pub payload: Value,
    pub placement: String,
}

/// A validated handshake as received by a guest.
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    pub payload: Value,
    pub placement: String,
    pub manifest: Manifest,
}

impl HostEnvelope {
    /// Convert to the wire value.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "command": self.command,
            "payload": self.payload,
            "placement": self.placement,
            "availableListeners": self.available_listeners,
            "availableMethods": self.available_methods,
            "scripts": self.scripts,
        })
    }
}

impl GuestEnvelope {
    /// Convert to the wire value.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "command": self.command,
            "payload": self.payload,
            "placement": self.placement,
        })
    }
}

/// Build a host → guest envelope.
///
/// Only the handshake carries the listener and method lists; scripts ride
/// along on every message.
pub fn build_host_envelope(
    command: &str,
    payload: Value,
    placement: &str,
    manifest: &Manifest,
) -> HostEnvelope {
    let handshake = is_reserved(command);
    HostEnvelope {
        command: command.to_string(),
        payload,
        placement: placement.to_string(),
        available_listeners: if handshake {
            manifest.listeners.clone()
        } else {
            None
        },
        available_methods: handshake.then(|| manifest.methods.clone()),
        scripts: manifest.scripts.clone(),
    }
}

/// Build a guest → host envelope.
pub fn build_guest_envelope(command: &str, payload: Value, placement: &str) -> GuestEnvelope {
    GuestEnvelope {
        command: command.to_string(),
        payload,
        placement: placement.to_string(),
    }
}

/// Parse any inbound envelope.
///
/// `command` and `placement` must be non-empty strings. A missing payload is `null`.
pub fn parse_inbound(data: &Value) -> Result<Inbound> {
    let fields = as_object(data)?;
    Ok(Inbound {
        command: required_string(fields, "command")?,
        payload: fields.get("payload").cloned().unwrap_or(Value::Null),
        placement: required_string(fields, "placement")?,
    })
}

/// Parse a handshake envelope, including its manifest.
pub fn parse_handshake(data: &Value) -> Result<Handshake> {
    let inbound = parse_inbound(data)?;
    if !is_reserved(&inbound.command) {
        return Err(EnvelopeError::InvalidMessageFormat(format!(
            "expected '{READY_COMMAND}' command, got '{}'",
            inbound.command
        )));
    }

    let fields = as_object(data)?;
    let manifest = Manifest {
        listeners: string_list(fields, "availableListeners")?,
        methods: string_list(fields, "availableMethods")?.unwrap_or_default(),
        scripts: string_list(fields, "scripts")?.unwrap_or_default(),
    };

    Ok(Handshake {
        payload: inbound.payload,
        placement: inbound.placement,
        manifest,
    })
}

fn as_object(data: &Value) -> Result<&Map<String, Value>> {
    data.as_object().ok_or_else(|| {
        EnvelopeError::InvalidMessageFormat("message is not an object".to_string())
    })
}

fn required_string(fields: &Map<String, Value>, key: &str) -> Result<String> {
    match fields.get(key) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
        Some(Value::String(_)) | Some(Value::Null) | None => Err(
            EnvelopeError::InvalidMessageFormat(format!("missing '{key}'")),
        ),
        Some(_) => Err(EnvelopeError::InvalidMessageFormat(format!(
            "'{key}' must be a string"
        ))),
    }
}

fn string_list(fields: &Map<String, Value>, key: &str) -> Result<Option<Vec<String>>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value::<Vec<String>>(value.clone())
            .map(Some)
            .map_err(|err| {
                EnvelopeError::InvalidMessageFormat(format!("'{key}' must be a string list: {err}"))
            }),
    }
}
