//! Wire envelope codec for framebridge.
//!
//! Every message crossing the frame boundary is a JSON object:
//!
//! ```text
//! Host → Guest (handshake): { command: "ready", payload, placement, availableListeners, availableMethods, scripts }
//! Host → Guest (regular):   { command, payload, placement, availableListeners: null, availableMethods: null, scripts }
//! Guest → Host:              { command, payload, placement }
//! ```
//!
//! This crate builds those objects, parses them strictly, and reads the
//! address parameters both sides derive their identity from.

pub mod address;
pub mod codec;
pub mod constants;
pub mod error;

pub use address::{placement_from_address, query_param, with_bridge_params};
pub use codec::{
    build_guest_envelope, build_host_envelope, parse_handshake, parse_inbound, GuestEnvelope,
    Handshake, HostEnvelope, Inbound, Manifest,
};
pub use constants::{is_reserved, ORIGIN_PARAM, PLACEMENT_PARAM, READY_COMMAND};
pub use error::{EnvelopeError, Result};
