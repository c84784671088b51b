use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use framebridge_envelope::{
    build_host_envelope, is_reserved, parse_inbound, placement_from_address, EnvelopeError,
    Manifest, READY_COMMAND,
};
use framebridge_transport::{
    origin_of, FrameElement, ListenerHandle, MessageEvent, MessageHandler, Window, OPAQUE_ORIGIN,
};
use serde_json::Value;

use crate::config::HostConfig;
use crate::error::{BridgeError, Result};
use crate::router::{EventRouter, Subscription};
use crate::validation::{payload_accepted, SchemaRegistryHandle};

/// The hosting document's side of the bridge.
///
/// Owns the frame reference, validates that inbound messages come from the
/// frame's origin and placement, runs registered methods, and relays events
/// to the guest through [`send`](Self::send).
pub struct HostEndpoint {
    inner: Arc<HostInner>,
    listener: Mutex<Option<ListenerHandle>>,
    method_subscriptions: Mutex<Vec<Subscription>>,
}

struct HostInner {
    window: Arc<dyn Window>,
    frame: FrameElement,
    peer_origin: Option<String>,
    placement: String,
    manifest: Manifest,
    router: EventRouter,
    schema_registry: Option<SchemaRegistryHandle>,
    destroyed: AtomicBool,
}

impl HostEndpoint {
    /// Attach to `config.frame` and send the handshake.
    pub fn new(window: Arc<dyn Window>, config: HostConfig) -> Result<Self> {
        let HostConfig {
            frame,
            methods,
            listeners,
            scripts,
            schema_registry,
        } = config;

        if frame.src.is_empty() {
            return Err(BridgeError::EmptyFrame);
        }

        let peer_origin = origin_of(&frame.src)
            .map_err(|err| BridgeError::InvalidFrameAddress {
                address: frame.src.clone(),
                reason: err.to_string(),
            })?;
        let peer_origin = (peer_origin != OPAQUE_ORIGIN).then_some(peer_origin);

        let placement = match placement_from_address(&frame.src) {
            Ok(Some(placement)) => placement,
            Ok(None) => return Err(BridgeError::PlacementMissing),
            Err(EnvelopeError::InvalidAddress { address, source }) => {
                return Err(BridgeError::InvalidFrameAddress {
                    address,
                    reason: source.to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        };

        let router = EventRouter::new();
        let mut registered = Vec::with_capacity(methods.len());
        let mut method_subscriptions = Vec::with_capacity(methods.len());
        for (name, handler) in methods {
            if is_reserved(&name) {
                tracing::error!(placement = %placement, command = %name, "The '{}' command is reserved.", READY_COMMAND);
                continue;
            }
            method_subscriptions.push(router.subscribe_callback(&name, handler));
            registered.push(name);
        }

        let inner = Arc::new(HostInner {
            window,
            frame,
            peer_origin,
            placement,
            manifest: Manifest {
                listeners,
                methods: registered,
                scripts,
            },
            router,
            schema_registry,
            destroyed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let handler: MessageHandler = Arc::new(move |event: &MessageEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.receive(event);
            }
        });
        let listener = inner.window.add_message_listener(handler)?;

        let host = Self {
            inner,
            listener: Mutex::new(Some(listener)),
            method_subscriptions: Mutex::new(method_subscriptions),
        };

        tracing::debug!(
            placement = %host.inner.placement,
            peer_origin = host.inner.peer_origin.as_deref().unwrap_or(OPAQUE_ORIGIN),
            methods = host.inner.manifest.methods.len(),
            "host endpoint attached"
        );
        host.inner.send(READY_COMMAND, Value::Null)?;
        Ok(host)
    }

    /// Send an event to the guest.
    ///
    /// Fails only when an allow-list is configured and `command` is not on
    /// it. Delivery problems are logged, never returned.
    pub fn send(&self, command: &str, payload: Value) -> Result<()> {
        self.inner.send(command, payload)
    }

    /// Send the handshake again, for guests that attached late.
    pub fn announce(&self) -> Result<()> {
        self.inner.send(READY_COMMAND, Value::Null)
    }

    /// Process one inbound message as the transport listener would.
    pub fn receive(&self, event: &MessageEvent) {
        self.inner.receive(event);
    }

    /// Remove the transport listener and every method registration.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(mut listener) = lock(&self.listener).take() {
            listener.remove();
        }
        let subscriptions = std::mem::take(&mut *lock(&self.method_subscriptions));
        for subscription in &subscriptions {
            subscription.unsubscribe();
        }

        tracing::debug!(placement = %self.inner.placement, "host endpoint destroyed");
    }

    /// Whether [`destroy`](Self::destroy) has run.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Placement namespace read from the frame address.
    pub fn placement(&self) -> &str {
        &self.inner.placement
    }

    /// Origin inbound messages must come from. `None` for opaque frame origins.
    pub fn peer_origin(&self) -> Option<&str> {
        self.inner.peer_origin.as_deref()
    }

    /// The controlled frame.
    pub fn frame(&self) -> &FrameElement {
        &self.inner.frame
    }

    /// Registered method names, in registration order.
    pub fn methods(&self) -> &[String] {
        &self.inner.manifest.methods
    }

    /// Allow-list of sendable event names. `None` means unrestricted.
    pub fn listeners(&self) -> Option<&[String]> {
        self.inner.manifest.listeners.as_deref()
    }

    /// Script snippets handed to the guest.
    pub fn scripts(&self) -> &[String] {
        &self.inner.manifest.scripts
    }

    /// Everything advertised in the handshake.
    pub fn manifest(&self) -> &Manifest {
        &self.inner.manifest
    }
}

impl HostInner {
    fn send(&self, command: &str, payload: Value) -> Result<()> {
        if let Some(listeners) = &self.manifest.listeners {
            if !is_reserved(command) && !listeners.iter().any(|name| name == command) {
                return Err(BridgeError::NotDefinedEventName(command.to_string()));
            }
        }

        if self.destroyed.load(Ordering::SeqCst) {
            tracing::debug!(placement = %self.placement, command, "host destroyed, not sending");
            return Ok(());
        }
        let Some(target) = self.frame.content_window else {
            return Ok(());
        };
        let Some(peer_origin) = self.peer_origin.as_deref() else {
            return Ok(());
        };

        let envelope = build_host_envelope(command, payload, &self.placement, &self.manifest);
        match self
            .window
            .post_message(target, envelope.to_value(), peer_origin)
        {
            Ok(()) => {
                tracing::debug!(placement = %self.placement, command, frame = %target, "message posted to guest");
            }
            Err(err) => {
                tracing::error!(placement = %self.placement, command, error = %err, "Error sending message");
            }
        }
        Ok(())
    }

    fn receive(&self, event: &MessageEvent) {
        if self.peer_origin.as_deref() != Some(event.origin.as_str()) {
            tracing::trace!(
                placement = %self.placement,
                origin = %event.origin,
                expected = self.peer_origin.as_deref().unwrap_or(OPAQUE_ORIGIN),
                "ignoring message from unexpected origin"
            );
            return;
        }
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }

        let inbound = match parse_inbound(&event.data) {
            Ok(inbound) => inbound,
            Err(err) => {
                tracing::error!(placement = %self.placement, error = %err, "Error processing event");
                return;
            }
        };

        if inbound.placement != self.placement {
            tracing::debug!(
                placement = %self.placement,
                received = %inbound.placement,
                command = %inbound.command,
                "ignoring message for another placement"
            );
            return;
        }

        if !payload_accepted(
            self.schema_registry.as_ref(),
            &self.placement,
            &inbound.command,
            &inbound.payload,
        ) {
            return;
        }

        match self.router.emit(&inbound.command, &inbound.payload) {
            Ok(0) => {
                tracing::debug!(placement = %self.placement, command = %inbound.command, "no method registered for command");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(
                    placement = %self.placement,
                    command = %inbound.command,
                    error = %err,
                    cause = err.bridge_error().map(tracing::field::debug),
                    "Error processing event"
                );
            }
        }
    }
}

impl std::fmt::Debug for HostEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostEndpoint")
            .field("placement", &self.inner.placement)
            .field("peer_origin", &self.inner.peer_origin)
            .field("manifest", &self.inner.manifest)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
