//! Command/event bridge between a hosting document and an embedded frame.
//!
//! A host exposes named methods and relayed events to a frame it controls.
//! The guest inside the frame discovers them through a `ready` handshake and
//! gets subscription and invocation proxies back. Every message is scoped by
//! origin and by a placement namespace.
//!
//! # Crate Structure
//!
//! - [`transport`]: the `Window` seam and the in-memory message bus
//! - [`envelope`]: wire envelopes, reserved names, address parameters
//! - [`schema`]: per-command JSON Schema validation (`schema` feature)
//! - [`peer`]: host and guest endpoints (`peer` feature)
//!
//! [`prelude`] pulls in what an embedder needs to wire up both sides.

/// Re-export transport types.
pub mod transport {
    pub use framebridge_transport::*;
}

/// Re-export envelope types.
pub mod envelope {
    pub use framebridge_envelope::*;
}

/// Re-export schema types (requires `schema` feature).
#[cfg(feature = "schema")]
pub mod schema {
    pub use framebridge_schema::*;
}

/// Re-export endpoint types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use framebridge_peer::*;
}

/// Types used by nearly every embedder.
pub mod prelude {
    pub use framebridge_envelope::{Handshake, Manifest, READY_COMMAND};
    #[cfg(feature = "peer")]
    pub use framebridge_peer::{
        BridgeError, Capabilities, GuestConfig, GuestEndpoint, HandlerResult, HandshakeState,
        HostConfig, HostEndpoint,
    };
    #[cfg(feature = "schema")]
    pub use framebridge_schema::{RegistryConfig, SchemaRegistry};
    pub use framebridge_transport::{FrameElement, MessageBus, MessageEvent, Window};
}

#[cfg(all(test, feature = "peer"))]
mod tests {
    use std::sync::Arc;

    use crate::prelude::*;

    #[test]
    fn prelude_wires_a_pair() {
        let bus = MessageBus::new();
        let parent = bus.open_window("https://app.example/").unwrap();
        let (child, frame) = bus
            .open_frame(
                parent.id(),
                "https://widget.example/?_origin=https://app.example&_placement=main",
            )
            .unwrap();

        let host = HostEndpoint::new(
            Arc::new(parent),
            HostConfig::new(frame).with_method("refresh", |_| Ok(())),
        )
        .unwrap();
        let guest = GuestEndpoint::new(Arc::new(child), |_, _| {}).unwrap();
        bus.dispatch_pending();

        assert_eq!(guest.handshake_state(), HandshakeState::Ready);
        assert_eq!(guest.capabilities().method_names(), vec!["refresh"]);
        assert_eq!(host.manifest().methods, vec!["refresh"]);
    }
}
