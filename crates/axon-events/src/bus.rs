//! Synchronous event bus over a fixed set of named events.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, trace};

use crate::error::{EventError, EventResult};

/// Handler attached to a named event.
///
/// Handlers receive the emit payload (or `None` when the event was emitted
/// without one) and their return value is discarded. Identity is the `Arc`
/// allocation: the same handler may be attached to any number of distinct
/// events, but at most once per event.
pub type EventHandler<T> = Arc<dyn Fn(Option<&T>) + Send + Sync>;

// Handlers never run while a lock is held, so a poisoned guard still guards
// consistent data.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Synchronous event bus with per-event ordered handler lists.
///
/// The event names given to [`EventBus::new`] define which events the bus can
/// emit and accept handlers for; membership never changes afterwards. Each
/// event keeps its handlers in attachment order, and [`emit`](Self::emit)
/// invokes every one of them on the caller's stack before returning.
///
/// Every dispatch iterates a snapshot of the handler list taken when it
/// started, so a handler that calls [`listen`](Self::listen) or
/// [`unlisten`](Self::unlisten) on the event being emitted changes only the
/// *next* dispatch. A handler that re-emits the event it is handling recurses
/// without bound and exhausts the stack; the bus does not guard against it.
///
/// The bus does not manage handler lifetime: detach handlers belonging to a
/// consumer before discarding the consumer, or they keep firing.
pub struct EventBus<T: 'static> {
    /// Handler lists keyed by event name. The key set is fixed at
    /// construction; only the lists behind the locks change.
    handlers: HashMap<String, RwLock<Vec<EventHandler<T>>>>,
}

impl<T: 'static> EventBus<T> {
    /// Create a bus that knows exactly the given event names.
    ///
    /// Each name starts with an empty handler list. Duplicate names collapse
    /// to a single registry entry.
    #[must_use]
    pub fn new<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let handlers: HashMap<_, _> = events
            .into_iter()
            .map(|event| (event.into(), RwLock::new(Vec::new())))
            .collect();
        debug!(events = handlers.len(), "event bus created");
        Self { handlers }
    }

    /// Invoke every handler attached to `event`, in attachment order.
    ///
    /// Each handler receives `data` as its only argument. Handlers run
    /// synchronously on the caller's stack; `emit` returns after the last one.
    ///
    /// # Errors
    ///
    /// [`EventError::UnknownEvent`] if `event` is not registered. No handler
    /// runs in that case.
    pub fn emit(&self, event: &str, data: Option<&T>) -> EventResult<()> {
        let handlers = self.slot(event)?;
        let snapshot: Vec<EventHandler<T>> = read(handlers).clone();
        trace!(event, handlers = snapshot.len(), "dispatching event");
        for handler in snapshot {
            handler(data);
        }
        Ok(())
    }

    /// Attach `handler` to `event`, after all currently attached handlers.
    ///
    /// # Errors
    ///
    /// [`EventError::UnknownEvent`] if `event` is not registered, or
    /// [`EventError::DuplicateHandler`] if this `Arc` is already attached to
    /// `event`. A failed attach leaves the handler list untouched.
    pub fn listen(&self, event: &str, handler: EventHandler<T>) -> EventResult<()> {
        let mut handlers = write(self.slot(event)?);
        if handlers.iter().any(|attached| Arc::ptr_eq(attached, &handler)) {
            return Err(EventError::DuplicateHandler(event.to_string()));
        }
        handlers.push(handler);
        debug!(event, handlers = handlers.len(), "handler attached");
        Ok(())
    }

    /// Detach `handler` from `event`.
    ///
    /// Matching is by `Arc` identity, never by comparing what the handler
    /// does. If a dispatch of `event` is in flight, the handler still runs in
    /// that dispatch's snapshot.
    ///
    /// # Errors
    ///
    /// [`EventError::UnknownEvent`] if `event` is not registered, or
    /// [`EventError::HandlerNotAttached`] if `handler` is not currently
    /// attached to it.
    pub fn unlisten(&self, event: &str, handler: &EventHandler<T>) -> EventResult<()> {
        let mut handlers = write(self.slot(event)?);
        let position = handlers
            .iter()
            .position(|attached| Arc::ptr_eq(attached, handler))
            .ok_or_else(|| EventError::HandlerNotAttached(event.to_string()))?;
        handlers.remove(position);
        debug!(event, handlers = handlers.len(), "handler detached");
        Ok(())
    }

    /// The registered event names, in no particular order.
    #[must_use]
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Whether `event` is part of the registry.
    #[must_use]
    pub fn contains(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Number of handlers currently attached to `event`.
    ///
    /// # Errors
    ///
    /// [`EventError::UnknownEvent`] if `event` is not registered.
    pub fn handler_count(&self, event: &str) -> EventResult<usize> {
        Ok(read(self.slot(event)?).len())
    }

    fn slot(&self, event: &str) -> EventResult<&RwLock<Vec<EventHandler<T>>>> {
        self.handlers
            .get(event)
            .ok_or_else(|| EventError::UnknownEvent(event.to_string()))
    }
}

impl<T: 'static> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (event, handlers) in &self.handlers {
            map.entry(event, &read(handlers).len());
        }
        map.finish()
    }
}
