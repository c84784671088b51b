use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use url::Url;

use crate::error::{Result, TransportError};
use crate::traits::{
    origin_of, FrameElement, ListenerHandle, MessageEvent, MessageHandler, Window, WindowId,
    ANY_ORIGIN, SAME_ORIGIN,
};

/// In-memory, same-process cross-document messaging.
///
/// Messages are queued by [`Window::post_message`] and delivered by
/// [`MessageBus::dispatch_pending`], the way a browser queues a task per
/// posted message. Cloning the bus yields another handle to the same state.
#[derive(Clone, Default)]
pub struct MessageBus {
    state: Arc<Mutex<BusState>>,
}

#[derive(Default)]
struct BusState {
    next_window: u64,
    next_listener: u64,
    windows: HashMap<WindowId, WindowEntry>,
    queue: VecDeque<Pending>,
}

struct WindowEntry {
    location: String,
    origin: String,
    parent: Option<WindowId>,
    listeners: Vec<(u64, MessageHandler)>,
}

struct Pending {
    target: WindowId,
    target_origin: String,
    event: MessageEvent,
}

/// A window opened on a [`MessageBus`].
#[derive(Clone)]
pub struct BusWindow {
    id: WindowId,
    bus: MessageBus,
}

impl MessageBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a top-level window showing `location`.
    pub fn open_window(&self, location: &str) -> Result<BusWindow> {
        self.open(location, None)
    }

    /// Open a frame inside `parent`, navigated to `src`.
    ///
    /// Returns the frame's own window and the element the parent sees.
    pub fn open_frame(&self, parent: WindowId, src: &str) -> Result<(BusWindow, FrameElement)> {
        self.lock().entry(parent)?;
        let window = self.open(src, Some(parent))?;
        let element = FrameElement::new(src, window.id());
        Ok((window, element))
    }

    /// Close a window and release its entry.
    ///
    /// Its listeners are dropped and messages queued for it are discarded.
    /// Closing an already-closed window is a no-op.
    pub fn close_window(&self, id: WindowId) -> Result<()> {
        let (entry, discarded) = {
            let mut state = self.lock();
            let Some(entry) = state.windows.remove(&id) else {
                return match state.missing(id) {
                    TransportError::WindowClosed(_) => Ok(()),
                    err => Err(err),
                };
            };
            let queued = state.queue.len();
            state.queue.retain(|pending| pending.target != id);
            (entry, queued - state.queue.len())
        };
        tracing::debug!(
            window = %id,
            dropped_listeners = entry.listeners.len(),
            discarded_messages = discarded,
            "window closed"
        );
        Ok(())
    }

    /// Handle to an already-open window.
    pub fn window(&self, id: WindowId) -> Result<BusWindow> {
        self.lock().entry(id)?;
        Ok(BusWindow {
            id,
            bus: self.clone(),
        })
    }

    /// Number of windows that are open.
    pub fn window_count(&self) -> usize {
        self.lock().windows.len()
    }

    /// Number of messages waiting for delivery.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Number of listeners currently registered on a window.
    pub fn listener_count(&self, id: WindowId) -> usize {
        self.lock()
            .windows
            .get(&id)
            .map_or(0, |entry| entry.listeners.len())
    }

    /// Deliver queued messages until the queue is empty.
    ///
    /// Messages posted by listeners during the drain are delivered in the
    /// same call. Returns how many messages reached a listener-bearing window.
    pub fn dispatch_pending(&self) -> usize {
        let mut delivered = 0;

        loop {
            let (event, listeners) = {
                let mut state = self.lock();
                let Some(pending) = state.queue.pop_front() else {
                    break;
                };

                let Some(entry) = state.windows.get(&pending.target) else {
                    tracing::debug!(target_window = %pending.target, "dropping message for closed window");
                    continue;
                };
                if pending.target_origin != ANY_ORIGIN && pending.target_origin != entry.origin {
                    tracing::debug!(
                        target_window = %pending.target,
                        target_origin = %pending.target_origin,
                        actual_origin = %entry.origin,
                        "dropping message: target origin mismatch"
                    );
                    continue;
                }

                let listeners: Vec<MessageHandler> = entry
                    .listeners
                    .iter()
                    .map(|(_, handler)| Arc::clone(handler))
                    .collect();
                (pending.event, listeners)
            };

            if listeners.is_empty() {
                continue;
            }
            delivered += 1;
            for handler in listeners {
                handler(&event);
            }
        }

        delivered
    }

    fn open(&self, location: &str, parent: Option<WindowId>) -> Result<BusWindow> {
        let origin = origin_of(location)?;
        let mut state = self.lock();
        state.next_window += 1;
        let id = WindowId::from_raw(state.next_window);
        state.windows.insert(
            id,
            WindowEntry {
                location: location.to_string(),
                origin,
                parent,
                listeners: Vec::new(),
            },
        );
        tracing::trace!(window = %id, location, "window opened");
        Ok(BusWindow {
            id,
            bus: self.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BusState {
    /// Error for an id with no entry. Ids are issued in order and never
    /// reused, so an issued id without an entry was closed.
    fn missing(&self, id: WindowId) -> TransportError {
        if (1..=self.next_window).contains(&id.as_raw()) {
            TransportError::WindowClosed(id)
        } else {
            TransportError::UnknownWindow(id)
        }
    }

    fn entry(&self, id: WindowId) -> Result<&WindowEntry> {
        self.windows.get(&id).ok_or_else(|| self.missing(id))
    }
}

impl BusWindow {
    /// The bus this window lives on.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    fn with_entry<T>(&self, f: impl FnOnce(&WindowEntry) -> T) -> Option<T> {
        self.bus.lock().windows.get(&self.id).map(f)
    }
}

impl Window for BusWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn origin(&self) -> String {
        self.with_entry(|entry| entry.origin.clone())
            .unwrap_or_default()
    }

    fn location(&self) -> String {
        self.with_entry(|entry| entry.location.clone())
            .unwrap_or_default()
    }

    fn parent(&self) -> Option<WindowId> {
        self.with_entry(|entry| entry.parent).flatten()
    }

    fn post_message(&self, target: WindowId, data: Value, target_origin: &str) -> Result<()> {
        let mut state = self.bus.lock();

        let sender_origin = state.entry(self.id)?.origin.clone();
        state.entry(target)?;

        let target_origin = resolve_target_origin(target_origin, &sender_origin)?;
        state.queue.push_back(Pending {
            target,
            target_origin,
            event: MessageEvent {
                origin: sender_origin,
                data,
                source: Some(self.id),
            },
        });
        Ok(())
    }

    fn add_message_listener(&self, handler: MessageHandler) -> Result<ListenerHandle> {
        let mut state = self.bus.lock();
        state.next_listener += 1;
        let listener_id = state.next_listener;

        let missing = state.missing(self.id);
        state
            .windows
            .get_mut(&self.id)
            .ok_or(missing)?
            .listeners
            .push((listener_id, handler));

        let bus = self.bus.clone();
        let window = self.id;
        Ok(ListenerHandle::new(listener_id, move || {
            if let Some(entry) = bus.lock().windows.get_mut(&window) {
                entry.listeners.retain(|(id, _)| *id != listener_id);
            }
        }))
    }
}

impl std::fmt::Debug for BusWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusWindow").field("id", &self.id).finish()
    }
}

fn resolve_target_origin(target_origin: &str, sender_origin: &str) -> Result<String> {
    match target_origin {
        ANY_ORIGIN => Ok(ANY_ORIGIN.to_string()),
        SAME_ORIGIN => Ok(sender_origin.to_string()),
        other => Url::parse(other)
            .map(|url| url.origin().ascii_serialization())
            .map_err(|_| TransportError::InvalidTargetOrigin(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<MessageEvent>>>, MessageHandler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: MessageHandler = Arc::new(move |event: &MessageEvent| {
            sink.lock().unwrap().push(event.clone());
        });
        (seen, handler)
    }

    #[test]
    fn delivers_with_sender_origin_and_source() {
        let bus = MessageBus::new();
        let parent = bus.open_window("https://parent.example/page").unwrap();
        let (child, frame) = bus
            .open_frame(parent.id(), "https://child.example/x?_placement=P")
            .unwrap();

        let (seen, handler) = recorder();
        let _handle = child.add_message_listener(handler).unwrap();

        parent
            .post_message(child.id(), json!({"hello": 1}), "https://child.example")
            .unwrap();
        assert_eq!(bus.pending(), 1);
        assert!(seen.lock().unwrap().is_empty());

        assert_eq!(bus.dispatch_pending(), 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].origin, "https://parent.example");
        assert_eq!(seen[0].source, Some(parent.id()));
        assert_eq!(seen[0].data, json!({"hello": 1}));
        assert_eq!(frame.content_window, Some(child.id()));
        assert_eq!(child.parent(), Some(parent.id()));
    }

    #[test]
    fn target_origin_mismatch_is_dropped() {
        let bus = MessageBus::new();
        let parent = bus.open_window("https://parent.example/").unwrap();
        let (child, _) = bus.open_frame(parent.id(), "https://child.example/").unwrap();

        let (seen, handler) = recorder();
        let _handle = child.add_message_listener(handler).unwrap();

        parent
            .post_message(child.id(), json!(1), "https://evil.example")
            .unwrap();
        assert_eq!(bus.dispatch_pending(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn wildcard_and_same_origin_targets() {
        let bus = MessageBus::new();
        let parent = bus.open_window("https://site.example/").unwrap();
        let (child, _) = bus.open_frame(parent.id(), "https://site.example/frame").unwrap();

        let (seen, handler) = recorder();
        let _handle = child.add_message_listener(handler).unwrap();

        parent.post_message(child.id(), json!("a"), ANY_ORIGIN).unwrap();
        parent.post_message(child.id(), json!("b"), SAME_ORIGIN).unwrap();
        assert_eq!(bus.dispatch_pending(), 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn invalid_target_origin_is_rejected() {
        let bus = MessageBus::new();
        let parent = bus.open_window("https://parent.example/").unwrap();
        let (child, _) = bus.open_frame(parent.id(), "https://child.example/").unwrap();

        let result = parent.post_message(child.id(), json!(null), "not a url");
        assert!(matches!(result, Err(TransportError::InvalidTargetOrigin(_))));
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn removed_listener_no_longer_receives() {
        let bus = MessageBus::new();
        let parent = bus.open_window("https://parent.example/").unwrap();
        let (child, _) = bus.open_frame(parent.id(), "https://child.example/").unwrap();

        let (seen, handler) = recorder();
        let mut handle = child.add_message_listener(handler).unwrap();
        assert_eq!(bus.listener_count(child.id()), 1);
        handle.remove();
        assert_eq!(bus.listener_count(child.id()), 0);

        parent.post_message(child.id(), json!(1), ANY_ORIGIN).unwrap();
        bus.dispatch_pending();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn messages_posted_during_dispatch_are_drained() {
        let bus = MessageBus::new();
        let parent = bus.open_window("https://parent.example/").unwrap();
        let (child, _) = bus.open_frame(parent.id(), "https://child.example/").unwrap();

        let replier = child.clone();
        let parent_id = parent.id();
        let _child_handle = child
            .add_message_listener(Arc::new(move |event: &MessageEvent| {
                replier
                    .post_message(parent_id, event.data.clone(), ANY_ORIGIN)
                    .unwrap();
            }))
            .unwrap();

        let (seen, handler) = recorder();
        let _parent_handle = parent.add_message_listener(handler).unwrap();

        parent.post_message(child.id(), json!("ping"), ANY_ORIGIN).unwrap();
        assert_eq!(bus.dispatch_pending(), 2);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].origin, "https://child.example");
    }

    #[test]
    fn closed_window_rejects_and_discards() {
        let bus = MessageBus::new();
        let parent = bus.open_window("https://parent.example/").unwrap();
        let (child, _) = bus.open_frame(parent.id(), "https://child.example/").unwrap();

        let (seen, handler) = recorder();
        let _handle = child.add_message_listener(handler.clone()).unwrap();

        parent.post_message(child.id(), json!(1), ANY_ORIGIN).unwrap();
        bus.close_window(child.id()).unwrap();
        assert_eq!(bus.pending(), 0);
        assert_eq!(bus.dispatch_pending(), 0);
        assert!(seen.lock().unwrap().is_empty());

        assert!(matches!(
            child.add_message_listener(handler),
            Err(TransportError::WindowClosed(_))
        ));
        assert!(matches!(
            child.post_message(parent.id(), json!(1), ANY_ORIGIN),
            Err(TransportError::WindowClosed(_))
        ));
        assert!(matches!(
            bus.window(child.id()),
            Err(TransportError::WindowClosed(_))
        ));
    }

    #[test]
    fn posting_to_closed_window_fails() {
        let bus = MessageBus::new();
        let parent = bus.open_window("https://parent.example/").unwrap();
        let (child, frame) = bus.open_frame(parent.id(), "https://child.example/").unwrap();

        bus.close_window(child.id()).unwrap();
        let result = parent.post_message(child.id(), json!(1), ANY_ORIGIN);
        assert!(matches!(result, Err(TransportError::WindowClosed(id)) if id == child.id()));
        assert_eq!(frame.content_window, Some(child.id()));
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn closed_window_entry_is_released() {
        let bus = MessageBus::new();
        let parent = bus.open_window("https://parent.example/").unwrap();
        let (child, _) = bus.open_frame(parent.id(), "https://child.example/").unwrap();
        let (_, handler) = recorder();
        let _handle = child.add_message_listener(handler).unwrap();
        assert_eq!(bus.window_count(), 2);

        child.post_message(parent.id(), json!("bye"), ANY_ORIGIN).unwrap();
        bus.close_window(child.id()).unwrap();
        assert_eq!(bus.window_count(), 1);
        assert_eq!(bus.listener_count(child.id()), 0);
        assert!(child.location().is_empty());

        // Messages the closed window posted earlier stay queued.
        assert_eq!(bus.pending(), 1);
        bus.close_window(child.id()).unwrap();
        assert!(matches!(
            bus.open_frame(child.id(), "https://grandchild.example/"),
            Err(TransportError::WindowClosed(_))
        ));
    }

    #[test]
    fn unknown_windows_are_errors() {
        let bus = MessageBus::new();
        let parent = bus.open_window("https://parent.example/").unwrap();
        let ghost = WindowId::from_raw(999);

        assert!(matches!(
            parent.post_message(ghost, json!(1), ANY_ORIGIN),
            Err(TransportError::UnknownWindow(_))
        ));
        assert!(matches!(
            bus.open_frame(ghost, "https://child.example/"),
            Err(TransportError::UnknownWindow(_))
        ));
        assert!(matches!(
            bus.close_window(ghost),
            Err(TransportError::UnknownWindow(_))
        ));
    }

    #[test]
    fn window_accessors() {
        let bus = MessageBus::new();
        let parent = bus.open_window("https://parent.example:8080/a?b=c").unwrap();
        assert_eq!(parent.origin(), "https://parent.example:8080");
        assert_eq!(parent.location(), "https://parent.example:8080/a?b=c");
        assert!(parent.parent().is_none());

        let again = bus.window(parent.id()).unwrap();
        assert_eq!(again.id(), parent.id());
    }
}
