//! Proxies the guest installs for each name the host advertised.

use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::error::{BridgeError, HandlerResult, Result};
use crate::guest::GuestInner;
use crate::router::Subscription;

/// Attaches callbacks to one host-relayed event.
#[derive(Clone)]
pub struct ListenerCapability {
    name: String,
    guest: Weak<GuestInner>,
}

/// Invokes one host method.
#[derive(Clone)]
pub struct MethodCapability {
    name: String,
    guest: Weak<GuestInner>,
}

/// Either kind of advertised capability.
#[derive(Debug, Clone)]
pub enum Capability {
    Subscribe(ListenerCapability),
    Invoke(MethodCapability),
}

/// The `listeners` and `run` tables built from one handshake.
///
/// Entries keep the order the host advertised them in.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    listeners: Vec<ListenerCapability>,
    run: Vec<MethodCapability>,
}

impl ListenerCapability {
    pub(crate) fn new(name: impl Into<String>, guest: Weak<GuestInner>) -> Self {
        Self {
            name: name.into(),
            guest,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribe `callback` to this event on the guest's router.
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        let guest = upgrade(&self.guest)?;
        guest.subscribe(&self.name, Arc::new(callback))
    }
}

impl MethodCapability {
    pub(crate) fn new(name: impl Into<String>, guest: Weak<GuestInner>) -> Self {
        Self {
            name: name.into(),
            guest,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send this command to the host with `payload`.
    pub fn invoke(&self, payload: Value) -> Result<()> {
        let guest = upgrade(&self.guest)?;
        guest.send_command(&self.name, payload)
    }
}

impl Capability {
    pub fn name(&self) -> &str {
        match self {
            Self::Subscribe(listener) => listener.name(),
            Self::Invoke(method) => method.name(),
        }
    }
}

impl Capabilities {
    pub(crate) fn new(listeners: Vec<ListenerCapability>, run: Vec<MethodCapability>) -> Self {
        Self { listeners, run }
    }

    /// Proxy for a host-relayed event.
    pub fn listener(&self, name: &str) -> Option<&ListenerCapability> {
        self.listeners.iter().find(|listener| listener.name == name)
    }

    /// Proxy for a host method.
    pub fn method(&self, name: &str) -> Option<&MethodCapability> {
        self.run.iter().find(|method| method.name == name)
    }

    /// The `listeners` table.
    pub fn listeners(&self) -> &[ListenerCapability] {
        &self.listeners
    }

    /// The `run` table.
    pub fn run(&self) -> &[MethodCapability] {
        &self.run
    }

    /// Listener names, in advertised order.
    pub fn listener_names(&self) -> Vec<&str> {
        self.listeners.iter().map(ListenerCapability::name).collect()
    }

    /// Method names, in advertised order.
    pub fn method_names(&self) -> Vec<&str> {
        self.run.iter().map(MethodCapability::name).collect()
    }

    /// Every capability, listeners first.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.listeners
            .iter()
            .cloned()
            .map(Capability::Subscribe)
            .chain(self.run.iter().cloned().map(Capability::Invoke))
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.run.is_empty()
    }
}

impl std::fmt::Debug for ListenerCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ListenerCapability").field(&self.name).finish()
    }
}

impl std::fmt::Debug for MethodCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MethodCapability").field(&self.name).finish()
    }
}

fn upgrade(guest: &Weak<GuestInner>) -> Result<Arc<GuestInner>> {
    let guest = guest.upgrade().ok_or(BridgeError::Destroyed)?;
    if guest.is_destroyed() {
        return Err(BridgeError::Destroyed);
    }
    Ok(guest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orphaned_capabilities_report_destroyed() {
        let listener = ListenerCapability::new("clicked", Weak::new());
        let method = MethodCapability::new("increment", Weak::new());

        assert!(matches!(
            listener.subscribe(|_: &Value| Ok(())),
            Err(BridgeError::Destroyed)
        ));
        assert!(matches!(
            method.invoke(Value::Null),
            Err(BridgeError::Destroyed)
        ));
    }

    #[test]
    fn tables_keep_advertised_order() {
        let capabilities = Capabilities::new(
            vec![
                ListenerCapability::new("b", Weak::new()),
                ListenerCapability::new("a", Weak::new()),
            ],
            vec![MethodCapability::new("run", Weak::new())],
        );

        assert_eq!(capabilities.listener_names(), vec!["b", "a"]);
        assert_eq!(capabilities.method_names(), vec!["run"]);
        assert!(capabilities.listener("a").is_some());
        assert!(capabilities.method("a").is_none());

        let tagged: Vec<(bool, String)> = capabilities
            .iter()
            .map(|capability| {
                (
                    matches!(capability, Capability::Invoke(_)),
                    capability.name().to_string(),
                )
            })
            .collect();
        assert_eq!(
            tagged,
            vec![
                (false, "b".to_string()),
                (false, "a".to_string()),
                (true, "run".to_string()),
            ]
        );
    }

    #[test]
    fn default_tables_are_empty() {
        assert!(Capabilities::default().is_empty());
    }
}
