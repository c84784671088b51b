use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::error::{Result, TransportError};

/// Target origin that matches any receiving window.
pub const ANY_ORIGIN: &str = "*";

/// Target origin that matches the sender's own origin.
pub const SAME_ORIGIN: &str = "/";

/// Serialized form of an opaque origin (`data:`, `about:blank`, ...).
pub const OPAQUE_ORIGIN: &str = "null";

/// Opaque identity of a browsing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u64);

impl WindowId {
    /// Create a window id from its raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window-{}", self.0)
    }
}

/// A delivered cross-document message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Serialized origin of the sending window.
    pub origin: String,
    /// Structured message data.
    pub data: Value,
    /// Sending window, when known.
    pub source: Option<WindowId>,
}

/// Callback invoked for every message delivered to a window.
pub type MessageHandler = Arc<dyn Fn(&MessageEvent) + Send + Sync>;

/// An embedded-frame element as seen from the hosting document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameElement {
    /// The frame's address. Empty when the frame was never navigated.
    pub src: String,
    /// The frame's live content window, if it has one.
    pub content_window: Option<WindowId>,
}

impl FrameElement {
    /// Create a frame element for an address with a live content window.
    pub fn new(src: impl Into<String>, content_window: WindowId) -> Self {
        Self {
            src: src.into(),
            content_window: Some(content_window),
        }
    }

    /// Create a frame element that has no content window yet.
    pub fn detached(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            content_window: None,
        }
    }
}

/// Exclusive ownership of one message-listener registration.
///
/// The listener stays registered until [`remove`](Self::remove) is called or
/// the handle is dropped. Removing twice is a no-op.
pub struct ListenerHandle {
    id: u64,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerHandle {
    /// Wrap a release action for a registration identified by `id`.
    pub fn new(id: u64, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            release: Some(Box::new(release)),
        }
    }

    /// Registration id, unique per transport.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the listener is still registered through this handle.
    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    /// Release the registration.
    pub fn remove(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.remove();
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// A browsing context able to send and receive cross-document messages.
pub trait Window: Send + Sync {
    /// This window's identity.
    fn id(&self) -> WindowId;

    /// Serialized origin of this window's document.
    fn origin(&self) -> String;

    /// Full address of this window's document.
    fn location(&self) -> String;

    /// The embedding window, for frames.
    fn parent(&self) -> Option<WindowId>;

    /// Post `data` to `target`.
    ///
    /// Delivery is asynchronous and only happens when `target_origin` matches
    /// the receiving window's origin (or is [`ANY_ORIGIN`]).
    fn post_message(&self, target: WindowId, data: Value, target_origin: &str) -> Result<()>;

    /// Register a listener for messages delivered to this window.
    fn add_message_listener(&self, handler: MessageHandler) -> Result<ListenerHandle>;
}

/// Serialized origin of an address, [`OPAQUE_ORIGIN`] for opaque schemes.
pub fn origin_of(address: &str) -> Result<String> {
    let url = Url::parse(address).map_err(|source| TransportError::InvalidAddress {
        address: address.to_string(),
        source,
    })?;
    Ok(url.origin().ascii_serialization())
}
