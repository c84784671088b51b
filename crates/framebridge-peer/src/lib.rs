//! Host and guest endpoints of the frame bridge.
//!
//! The host owns an embedded frame and exposes methods and relayed events to
//! it. The guest discovers them through the `ready` handshake and gets
//! subscription and invocation proxies back.

pub mod capability;
pub mod config;
pub mod error;
pub mod guest;
pub mod host;
pub mod router;
pub mod scripts;
mod validation;

pub use capability::{Capabilities, Capability, ListenerCapability, MethodCapability};
pub use config::{GuestConfig, HostConfig, MethodHandler};
pub use error::{BridgeError, HandlerError, HandlerResult, Result};
pub use guest::{GuestEndpoint, HandshakeState, ReadyCallback};
pub use host::HostEndpoint;
pub use router::{Callback, EventRouter, Subscription};
pub use scripts::{
    parse_script_tag, NoopScriptLoader, RecordingScriptLoader, ScriptDescriptor, ScriptLoader,
    ScriptTagLoader,
};
pub use validation::SchemaRegistryHandle;
