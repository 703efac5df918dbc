//! Publish-subscribe hub for live data updates.
//!
//! Listeners register per [`EventKind`] and receive every [`LiveEvent`] of
//! that kind. Registering the same listener twice keeps a single
//! registration. A panicking listener is logged and skipped; the remaining
//! listeners still run and the panic never reaches the notifier.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ScoresUpdated,
    GameUpdated,
    OddsUpdated,
    RefreshFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    ScoresUpdated { games: Vec<Value> },
    GameUpdated { event_id: String, game: Value },
    OddsUpdated { event_id: String, odds: Vec<Value> },
    RefreshFailed { source: String, message: String },
}

impl LiveEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LiveEvent::ScoresUpdated { .. } => EventKind::ScoresUpdated,
            LiveEvent::GameUpdated { .. } => EventKind::GameUpdated,
            LiveEvent::OddsUpdated { .. } => EventKind::OddsUpdated,
            LiveEvent::RefreshFailed { .. } => EventKind::RefreshFailed,
        }
    }
}

pub type Listener = Arc<dyn Fn(&LiveEvent) + Send + Sync>;

type Registry = HashMap<EventKind, Vec<(u64, Listener)>>;

#[derive(Default)]
struct HubInner {
    listeners: Mutex<Registry>,
    next_id: AtomicU64,
}

impl HubInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Listeners never run under the lock, so poisoning only means a
        // panic elsewhere; the map itself is still consistent.
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle to a shared hub.
#[derive(Clone, Default)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

/// Returned by [`NotificationHub::subscribe`]; call
/// [`Subscription::unsubscribe`] to stop receiving events.
#[derive(Debug)]
#[must_use = "dropping a Subscription keeps the listener registered"]
pub struct Subscription {
    hub: Weak<HubInner>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    /// Returns whether the listener was still registered.
    pub fn unsubscribe(self) -> bool {
        let Some(hub) = self.hub.upgrade() else {
            return false;
        };
        let mut registry = hub.registry();
        let Some(listeners) = registry.get_mut(&self.kind) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        before != listeners.len()
    }
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `kind`. A listener already registered for
    /// that kind is not added again; the returned handle refers to the
    /// existing registration.
    pub fn subscribe(&self, kind: EventKind, listener: Listener) -> Subscription {
        let mut registry = self.inner.registry();
        let listeners = registry.entry(kind).or_default();

        let id = match listeners.iter().find(|(_, l)| same_listener(l, &listener)) {
            Some((id, _)) => *id,
            None => {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                listeners.push((id, listener));
                id
            }
        };

        Subscription {
            hub: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Registers a closure. Each call creates a distinct listener.
    pub fn subscribe_fn<F>(&self, kind: EventKind, f: F) -> Subscription
    where
        F: Fn(&LiveEvent) + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(f))
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.registry().get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Delivers `event` to every listener of its kind. Returns how many
    /// listeners completed without panicking.
    pub fn notify(&self, event: &LiveEvent) -> usize {
        let kind = event.kind();
        // Snapshot so listeners may subscribe or unsubscribe while running.
        let listeners: Vec<Listener> = self
            .inner
            .registry()
            .get(&kind)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(?kind, panic = %message, "Listener panicked");
                }
            }
        }
        debug!(?kind, delivered, "Event delivered");
        delivered
    }
}
