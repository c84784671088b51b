use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use framebridge_envelope::{
    build_guest_envelope, is_reserved, parse_handshake, parse_inbound, query_param, Handshake,
    EnvelopeError, ORIGIN_PARAM, PLACEMENT_PARAM, READY_COMMAND,
};
use framebridge_transport::{
    origin_of, ListenerHandle, MessageEvent, MessageHandler, Window, OPAQUE_ORIGIN,
};
use serde_json::Value;

use crate::capability::{Capabilities, Capability, ListenerCapability, MethodCapability};
use crate::config::GuestConfig;
use crate::error::{BridgeError, HandlerResult, Result};
use crate::router::{Callback, EventRouter, Subscription};
use crate::scripts::ScriptLoader;
use crate::validation::{payload_accepted, SchemaRegistryHandle};

/// User callback run after every handshake.
pub type ReadyCallback = Arc<dyn Fn(&Handshake, &Capabilities) + Send + Sync>;

/// Progress of the guest's handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for the host's handshake.
    Pending,
    /// At least one handshake was received.
    Ready,
    /// The configured ready timeout elapsed with no handshake.
    TimedOut,
}

/// The embedded document's side of the bridge.
///
/// Reads the expected parent origin and placement from its own location,
/// waits for the host's handshake and exposes the advertised listeners and
/// methods as [`Capabilities`].
pub struct GuestEndpoint {
    inner: Arc<GuestInner>,
}

pub(crate) struct GuestInner {
    window: Arc<dyn Window>,
    parent_origin: String,
    placement: String,
    router: EventRouter,
    script_loader: Arc<dyn ScriptLoader>,
    schema_registry: Option<SchemaRegistryHandle>,
    on_ready: ReadyCallback,
    deadline: Option<Instant>,
    state: Mutex<GuestState>,
    listener: Mutex<Option<ListenerHandle>>,
    destroyed: AtomicBool,
}

#[derive(Default)]
struct GuestState {
    handshake: Option<Handshake>,
    capabilities: Capabilities,
}

impl GuestEndpoint {
    /// Attach to `window` with the default configuration.
    pub fn new<F>(window: Arc<dyn Window>, on_ready: F) -> Result<Self>
    where
        F: Fn(&Handshake, &Capabilities) + Send + Sync + 'static,
    {
        Self::with_config(window, on_ready, GuestConfig::default())
    }

    /// Attach to `window`.
    ///
    /// Fails when the window's location lacks `_origin` or `_placement`, or
    /// when `_origin` is the opaque origin `null`.
    pub fn with_config<F>(window: Arc<dyn Window>, on_ready: F, config: GuestConfig) -> Result<Self>
    where
        F: Fn(&Handshake, &Capabilities) + Send + Sync + 'static,
    {
        let location = window.location();
        let declared_origin =
            read_param(&location, ORIGIN_PARAM)?.ok_or(BridgeError::OriginMissing)?;
        let placement =
            read_param(&location, PLACEMENT_PARAM)?.ok_or(BridgeError::PlacementMissing)?;
        let parent_origin = expected_parent_origin(declared_origin)?;

        let GuestConfig {
            script_loader,
            ready_timeout,
            schema_registry,
        } = config;

        let inner = Arc::new(GuestInner {
            window,
            parent_origin,
            placement,
            router: EventRouter::new(),
            script_loader,
            schema_registry,
            on_ready: Arc::new(on_ready),
            deadline: ready_timeout.map(|timeout| Instant::now() + timeout),
            state: Mutex::new(GuestState::default()),
            listener: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        inner.router.subscribe(READY_COMMAND, move |data: &Value| {
            match weak.upgrade() {
                Some(inner) => inner.on_handshake(&weak, data),
                None => Ok(()),
            }
        });

        let weak = Arc::downgrade(&inner);
        let handler: MessageHandler = Arc::new(move |event: &MessageEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.receive(event);
            }
        });
        let listener = inner.window.add_message_listener(handler)?;
        *lock(&inner.listener) = Some(listener);

        tracing::debug!(
            placement = %inner.placement,
            parent_origin = %inner.parent_origin,
            "guest endpoint attached"
        );
        Ok(Self { inner })
    }

    /// Process one inbound message as the transport listener would.
    pub fn receive(&self, event: &MessageEvent) {
        self.inner.receive(event);
    }

    /// Send `command` to the host.
    ///
    /// No allow-list applies on this side; the host ignores commands it has
    /// no method for.
    pub fn send_command(&self, command: &str, payload: Value) -> Result<()> {
        self.inner.send_command(command, payload)
    }

    /// Proxy for a host-relayed event, once advertised.
    pub fn listener(&self, name: &str) -> Option<ListenerCapability> {
        lock(&self.inner.state).capabilities.listener(name).cloned()
    }

    /// Proxy for a host method, once advertised.
    pub fn method(&self, name: &str) -> Option<MethodCapability> {
        lock(&self.inner.state).capabilities.method(name).cloned()
    }

    /// The `listeners` table.
    pub fn listeners(&self) -> Vec<ListenerCapability> {
        lock(&self.inner.state).capabilities.listeners().to_vec()
    }

    /// The `run` table.
    pub fn run(&self) -> Vec<MethodCapability> {
        lock(&self.inner.state).capabilities.run().to_vec()
    }

    /// Snapshot of both tables.
    pub fn capabilities(&self) -> Capabilities {
        lock(&self.inner.state).capabilities.clone()
    }

    /// Every capability, tagged by kind.
    pub fn capability_list(&self) -> Vec<Capability> {
        self.capabilities().iter().collect()
    }

    /// The most recent handshake.
    pub fn handshake(&self) -> Option<Handshake> {
        lock(&self.inner.state).handshake.clone()
    }

    pub fn handshake_state(&self) -> HandshakeState {
        if lock(&self.inner.state).handshake.is_some() {
            return HandshakeState::Ready;
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => HandshakeState::TimedOut,
            _ => HandshakeState::Pending,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.handshake_state() == HandshakeState::Ready
    }

    /// Placement namespace read from the window location.
    pub fn placement(&self) -> &str {
        &self.inner.placement
    }

    /// Origin inbound messages must come from.
    pub fn parent_origin(&self) -> &str {
        &self.inner.parent_origin
    }

    /// Remove the transport listener and drop both tables and every
    /// subscription. Capabilities already handed out fail afterwards.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(mut listener) = lock(&self.inner.listener).take() {
            listener.remove();
        }
        let state = std::mem::take(&mut *lock(&self.inner.state));
        drop(state);
        self.inner.router.clear();

        tracing::debug!(placement = %self.inner.placement, "guest endpoint destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }
}

impl GuestInner {
    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub(crate) fn subscribe(&self, name: &str, callback: Callback) -> Result<Subscription> {
        if self.is_destroyed() {
            return Err(BridgeError::Destroyed);
        }
        if is_reserved(name) {
            return Err(BridgeError::ReservedCommand(name.to_string()));
        }
        Ok(self.router.subscribe_callback(name, callback))
    }

    pub(crate) fn send_command(&self, command: &str, payload: Value) -> Result<()> {
        if self.is_destroyed() {
            return Err(BridgeError::Destroyed);
        }
        if is_reserved(command) {
            return Err(BridgeError::ReservedCommand(command.to_string()));
        }
        let parent = self.window.parent().ok_or(BridgeError::NoParent)?;

        let envelope = build_guest_envelope(command, payload, &self.placement);
        self.window
            .post_message(parent, envelope.to_value(), &self.parent_origin)?;
        tracing::debug!(placement = %self.placement, command, parent = %parent, "command posted to host");
        Ok(())
    }

    fn receive(&self, event: &MessageEvent) {
        if event.origin != self.parent_origin {
            tracing::trace!(
                placement = %self.placement,
                origin = %event.origin,
                expected = %self.parent_origin,
                "ignoring message from unexpected origin"
            );
            return;
        }
        if self.is_destroyed() {
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

        let outcome = if is_reserved(&inbound.command) {
            self.router.emit(READY_COMMAND, &event.data)
        } else if payload_accepted(
            self.schema_registry.as_ref(),
            &self.placement,
            &inbound.command,
            &inbound.payload,
        ) {
            self.router.emit(&inbound.command, &inbound.payload)
        } else {
            return;
        };

        if let Err(err) = outcome {
            tracing::error!(
                placement = %self.placement,
                command = %inbound.command,
                error = %err,
                cause = err.bridge_error().map(tracing::field::debug),
                "Error processing event"
            );
        }
    }

    fn on_handshake(&self, weak: &Weak<GuestInner>, data: &Value) -> HandlerResult {
        let handshake = parse_handshake(data).map_err(BridgeError::from)?;

        let listeners = handshake
            .manifest
            .listeners
            .iter()
            .flatten()
            .filter(|name| self.advertisable(name))
            .map(|name| ListenerCapability::new(name.as_str(), Weak::clone(weak)))
            .collect();
        let run = handshake
            .manifest
            .methods
            .iter()
            .filter(|name| self.advertisable(name))
            .map(|name| MethodCapability::new(name.as_str(), Weak::clone(weak)))
            .collect();
        let capabilities = Capabilities::new(listeners, run);

        {
            let mut state = lock(&self.state);
            state.handshake = Some(handshake.clone());
            state.capabilities = capabilities.clone();
        }

        tracing::info!(
            placement = %self.placement,
            listeners = capabilities.listeners().len(),
            methods = capabilities.run().len(),
            scripts = handshake.manifest.scripts.len(),
            "handshake received"
        );

        self.script_loader.load_scripts(&handshake.manifest.scripts);
        (self.on_ready)(&handshake, &capabilities);
        Ok(())
    }

    fn advertisable(&self, name: &str) -> bool {
        if is_reserved(name) {
            tracing::warn!(placement = %self.placement, name, "host advertised the reserved command, skipping");
            return false;
        }
        true
    }
}

impl std::fmt::Debug for GuestEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestEndpoint")
            .field("placement", &self.inner.placement)
            .field("parent_origin", &self.inner.parent_origin)
            .field("state", &self.handshake_state())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

fn read_param(location: &str, name: &str) -> Result<Option<String>> {
    match query_param(location, name) {
        Ok(value) => Ok(value),
        Err(EnvelopeError::InvalidAddress { address, source }) => {
            Err(BridgeError::InvalidFrameAddress {
                address,
                reason: source.to_string(),
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Origin a sender must present for the guest to trust it.
///
/// Tuple origins are normalized so `_origin=https://host/page` matches
/// `https://host`. Addresses with an opaque origin (`file:`, `data:`) keep
/// the declared text, which no window's serialized origin can equal. The
/// literal `null` would admit every opaque-origin window and is refused.
fn expected_parent_origin(declared: String) -> Result<String> {
    if declared == OPAQUE_ORIGIN {
        return Err(BridgeError::OriginMissing);
    }
    match origin_of(&declared) {
        Ok(origin) if origin != OPAQUE_ORIGIN => Ok(origin),
        _ => Ok(declared),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
