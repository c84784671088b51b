use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use framebridge_transport::FrameElement;
use serde_json::Value;

use crate::error::HandlerResult;
use crate::scripts::{NoopScriptLoader, ScriptLoader};
use crate::validation::SchemaRegistryHandle;

/// Host-side handler for a command invoked by the guest.
pub type MethodHandler = Arc<dyn Fn(&Value) -> HandlerResult + Send + Sync>;

/// Construction inputs for a [`HostEndpoint`](crate::HostEndpoint).
#[derive(Clone)]
pub struct HostConfig {
    /// The controlled frame. Must already be navigated.
    pub frame: FrameElement,
    /// Commands the guest may invoke, in registration order.
    pub methods: Vec<(String, MethodHandler)>,
    /// Event names `send` accepts. `None` means unrestricted.
    pub listeners: Option<Vec<String>>,
    /// Script tag snippets handed to the guest.
    pub scripts: Vec<String>,
    /// Optional validation of inbound payloads.
    pub schema_registry: Option<SchemaRegistryHandle>,
}

impl HostConfig {
    /// Config for `frame` with no methods, no scripts and unrestricted sends.
    pub fn new(frame: FrameElement) -> Self {
        Self {
            frame,
            methods: Vec::new(),
            listeners: None,
            scripts: Vec::new(),
            schema_registry: None,
        }
    }

    /// Register a method. A second registration under the same name replaces
    /// the handler but keeps the original position.
    pub fn with_method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        let name = name.into();
        let handler: MethodHandler = Arc::new(handler);
        match self.methods.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = handler,
            None => self.methods.push((name, handler)),
        }
        self
    }

    /// Restrict `send` to these event names.
    pub fn with_listeners<I, S>(mut self, listeners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.listeners = Some(listeners.into_iter().map(Into::into).collect());
        self
    }

    /// Append a script snippet.
    pub fn with_script(mut self, snippet: impl Into<String>) -> Self {
        self.scripts.push(snippet.into());
        self
    }

    /// Append several script snippets.
    pub fn with_scripts<I, S>(mut self, snippets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scripts.extend(snippets.into_iter().map(Into::into));
        self
    }

    /// Attach shared schema registry.
    #[cfg(feature = "schema")]
    pub fn with_schema_registry(
        mut self,
        registry: std::sync::Arc<framebridge_schema::SchemaRegistry>,
    ) -> Self {
        self.schema_registry = Some(registry);
        self
    }
}

impl fmt::Debug for HostConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<&str> = self.methods.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("HostConfig")
            .field("frame", &self.frame)
            .field("methods", &methods)
            .field("listeners", &self.listeners)
            .field("scripts", &self.scripts.len())
            .field("schema_registry", &self.schema_registry.is_some())
            .finish()
    }
}

/// Construction inputs for a [`GuestEndpoint`](crate::GuestEndpoint).
#[derive(Clone)]
pub struct GuestConfig {
    /// Receives the script snippets advertised in the handshake.
    pub script_loader: Arc<dyn ScriptLoader>,
    /// How long to wait for a handshake before reporting it timed out.
    pub ready_timeout: Option<Duration>,
    /// Optional validation of inbound payloads.
    pub schema_registry: Option<SchemaRegistryHandle>,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            script_loader: Arc::new(NoopScriptLoader),
            ready_timeout: None,
            schema_registry: None,
        }
    }
}

impl GuestConfig {
    /// Override the script loader.
    pub fn with_script_loader(mut self, loader: impl ScriptLoader + 'static) -> Self {
        self.script_loader = Arc::new(loader);
        self
    }

    /// Report [`HandshakeState::TimedOut`](crate::HandshakeState::TimedOut)
    /// when no handshake arrived within `timeout` of construction.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }

    /// Attach shared schema registry.
    #[cfg(feature = "schema")]
    pub fn with_schema_registry(
        mut self,
        registry: std::sync::Arc<framebridge_schema::SchemaRegistry>,
    ) -> Self {
        self.schema_registry = Some(registry);
        self
    }
}

impl fmt::Debug for GuestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestConfig")
            .field("ready_timeout", &self.ready_timeout)
            .field("schema_registry", &self.schema_registry.is_some())
            .finish_non_exhaustive()
    }
}
