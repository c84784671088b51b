//! Named-topic publish/subscribe registry local to one endpoint.
//!
//! Callbacks for a name run in registration order. `emit` iterates a
//! snapshot, so callbacks may subscribe or unsubscribe (themselves included)
//! while an emit is in progress. The registry lock is never held while a
//! callback runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;

use crate::error::{HandlerError, HandlerResult};

/// A registered subscriber callback.
pub type Callback = Arc<dyn Fn(&Value) -> HandlerResult + Send + Sync>;

/// Publish/subscribe registry. Clones share the same registry.
#[derive(Clone, Default)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

#[derive(Default)]
struct RouterInner {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<String, Vec<(u64, Callback)>>>,
}

/// Capability to remove one subscription.
#[derive(Clone)]
pub struct Subscription {
    name: String,
    id: u64,
    router: Weak<RouterInner>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` to the subscribers of `name`.
    pub fn subscribe<F>(&self, name: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_callback(name, Arc::new(callback))
    }

    /// Append an already shared callback to the subscribers of `name`.
    pub fn subscribe_callback(&self, name: &str, callback: Callback) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .lock()
            .entry(name.to_string())
            .or_default()
            .push((id, callback));

        Subscription {
            name: name.to_string(),
            id,
            router: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every subscriber of `name` with `payload`.
    ///
    /// Returns how many callbacks ran. The first callback error stops the
    /// iteration and is returned to the caller.
    pub fn emit(&self, name: &str, payload: &Value) -> Result<usize, HandlerError> {
        let snapshot: Vec<Callback> = match self.inner.lock().get(name) {
            Some(callbacks) => callbacks
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect(),
            None => return Ok(0),
        };

        for (ran, callback) in snapshot.iter().enumerate() {
            if let Err(err) = callback(payload) {
                tracing::trace!(topic = name, ran, "subscriber failed");
                return Err(err);
            }
        }
        Ok(snapshot.len())
    }

    /// Number of callbacks currently subscribed to `name`.
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.inner.lock().get(name).map_or(0, Vec::len)
    }

    /// Names with at least one subscriber, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.inner.lock());
        drop(removed);
    }
}

impl RouterInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<(u64, Callback)>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Subscription {
    /// Event name this subscription is attached to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove this subscription's callback. Safe to call more than once.
    pub fn unsubscribe(&self) {
        let Some(router) = self.router.upgrade() else {
            return;
        };
        let removed = {
            let mut subscribers = router.lock();
            let Some(callbacks) = subscribers.get_mut(&self.name) else {
                return;
            };
            let position = callbacks.iter().position(|(id, _)| *id == self.id);
            let removed = position.map(|index| callbacks.remove(index));
            if callbacks.is_empty() {
                subscribers.remove(&self.name);
            }
            removed
        };
        drop(removed);
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("names", &self.names())
            .finish()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Value) -> HandlerResult + Send + Sync) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move |_: &Value| {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn emit_reaches_subscribers_in_order() {
        let router = EventRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            router.subscribe("clicked", move |payload: &Value| {
                seen.lock().unwrap().push((tag, payload.clone()));
                Ok(())
            });
        }

        assert_eq!(router.emit("clicked", &json!({"x": 1})).unwrap(), 3);
        let seen = seen.lock().unwrap();
        let tags: Vec<&str> = seen.iter().map(|(tag, _)| *tag).collect();
        assert_eq!(tags, vec!["first", "second", "third"]);
        assert!(seen.iter().all(|(_, payload)| payload == &json!({"x": 1})));
    }

    #[test]
    fn emit_without_subscribers_is_noop() {
        let router = EventRouter::new();
        assert_eq!(router.emit("nobody", &Value::Null).unwrap(), 0);
    }

    #[test]
    fn unsubscribe_removes_only_that_callback() {
        let router = EventRouter::new();
        let (kept_count, kept) = counter();
        let (removed_count, removed) = counter();

        let _kept = router.subscribe("clicked", kept);
        let subscription = router.subscribe("clicked", removed);
        subscription.unsubscribe();

        router.emit("clicked", &Value::Null).unwrap();
        assert_eq!(kept_count.load(Ordering::SeqCst), 1);
        assert_eq!(removed_count.load(Ordering::SeqCst), 0);
        assert_eq!(router.subscriber_count("clicked"), 1);
    }

    #[test]
    fn subscribe_then_unsubscribe_leaves_nothing() {
        let router = EventRouter::new();
        let (count, callback) = counter();

        let subscription = router.subscribe("clicked", callback);
        subscription.unsubscribe();
        subscription.unsubscribe();

        assert_eq!(router.emit("clicked", &Value::Null).unwrap(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(router.names().is_empty());
    }

    #[test]
    fn out_of_order_unsubscribe_is_safe() {
        let router = EventRouter::new();
        let (_, a) = counter();
        let (_, b) = counter();
        let first = router.subscribe("e", a);
        let second = router.subscribe("e", b);

        second.unsubscribe();
        first.unsubscribe();
        second.unsubscribe();
        first.unsubscribe();
        assert_eq!(router.subscriber_count("e"), 0);
    }

    #[test]
    fn same_closure_registered_twice_is_removed_once() {
        let router = EventRouter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let shared: Callback = Arc::new(move |_: &Value| {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let first = router.subscribe_callback("e", Arc::clone(&shared));
        let _second = router.subscribe_callback("e", shared);
        first.unsubscribe();

        router.emit("e", &Value::Null).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn self_unsubscribe_during_emit_keeps_iteration_intact() {
        let router = EventRouter::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let (after_count, after) = counter();

        let own = Arc::clone(&slot);
        let subscription = router.subscribe("once", move |_: &Value| {
            if let Some(subscription) = own.lock().unwrap().take() {
                subscription.unsubscribe();
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(subscription);
        router.subscribe("once", after);

        assert_eq!(router.emit("once", &Value::Null).unwrap(), 2);
        assert_eq!(router.emit("once", &Value::Null).unwrap(), 1);
        assert_eq!(after_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscribing_during_emit_applies_to_next_emit() {
        let router = EventRouter::new();
        let (late_count, late) = counter();
        let late = Arc::new(late);

        let handle = router.clone();
        router.subscribe("grow", move |_: &Value| {
            let late = Arc::clone(&late);
            handle.subscribe("grow", move |payload: &Value| late(payload));
            Ok(())
        });

        assert_eq!(router.emit("grow", &Value::Null).unwrap(), 1);
        assert_eq!(late_count.load(Ordering::SeqCst), 0);
        assert_eq!(router.emit("grow", &Value::Null).unwrap(), 2);
        assert_eq!(late_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_error_stops_and_propagates() {
        let router = EventRouter::new();
        let (after_count, after) = counter();

        router.subscribe("boom", |_: &Value| Err(HandlerError::new("handler exploded")));
        router.subscribe("boom", after);

        let err = router.emit("boom", &Value::Null).unwrap_err();
        assert_eq!(err.message(), "handler exploded");
        assert_eq!(after_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let router = EventRouter::new();
        let (count, callback) = counter();
        let subscription = router.subscribe("a", callback);
        router.subscribe("b", |_: &Value| Ok(()));

        assert_eq!(router.names(), vec!["a", "b"]);
        router.clear();
        subscription.unsubscribe();

        assert_eq!(router.emit("a", &Value::Null).unwrap(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_after_router_dropped_is_noop() {
        let router = EventRouter::new();
        let subscription = router.subscribe("a", |_: &Value| Ok(()));
        drop(router);
        subscription.unsubscribe();
        assert_eq!(subscription.name(), "a");
    }
}
