//! Cross-document messaging transport abstraction.
//!
//! This is the lowest layer of framebridge. It models the host runtime's
//! messaging primitive: post a structured message to a target window with a
//! declared target origin, and receive messages through a listener that sees
//! the sender's origin, the data and the source window.
//!
//! - [`Window`] is the seam every endpoint talks to.
//! - [`ListenerHandle`] owns one listener registration and releases it on
//!   [`ListenerHandle::remove`] or drop.
//! - [`MessageBus`] is an in-memory, same-process implementation with
//!   browser-like queued delivery.

pub mod bus;
pub mod error;
pub mod traits;

pub use bus::{BusWindow, MessageBus};
pub use error::{Result, TransportError};
pub use traits::{
    origin_of, FrameElement, ListenerHandle, MessageEvent, MessageHandler, Window, WindowId,
    ANY_ORIGIN, OPAQUE_ORIGIN, SAME_ORIGIN,
};
