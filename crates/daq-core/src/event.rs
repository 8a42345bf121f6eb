//! Events and listeners.
//!
//! Elements and generators notify interested parties through the
//! [`Listener`] trait. Every event carries a [`Propagation`] priority:
//!
//! - `Suppress`: recorded by the source, never delivered.
//! - `Propagate`: delivered when the value differs from the last delivered one.
//! - `PropagateSynchronously`: always delivered, and delivery has completed
//!   before the call that fired it returns.
//!
//! Delivery never happens while the source holds its own lock, so a listener
//! may call back into the source.

use crate::state::State;
use parking_lot::RwLock;
use std::sync::Arc;

/// Delivery priority of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Propagation {
    /// Recorded, never delivered.
    Suppress,
    /// Delivered when the value changed.
    #[default]
    Propagate,
    /// Always delivered, before the firing call returns.
    PropagateSynchronously,
}

impl Propagation {
    /// `true` for `Suppress`.
    pub fn is_suppressed(self) -> bool {
        matches!(self, Propagation::Suppress)
    }
}

/// What an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Element state changed.
    State,
    /// Status text changed.
    Status,
    /// Motor position.
    Position,
    /// Counter or sensor value.
    Value,
    /// Trigger/gate went active. Value is the repetition index.
    Active,
    /// Trigger/gate went passive. Value is the repetition index.
    Passive,
}

/// Event name plus its propagation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventType {
    /// What happened.
    pub kind: EventKind,
    /// How it is delivered.
    pub propagation: Propagation,
}

impl EventType {
    /// Pairs an event kind with its propagation.
    pub const fn new(kind: EventKind, propagation: Propagation) -> Self {
        Self { kind, propagation }
    }
}

/// Event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue {
    /// New element state.
    State(State),
    /// New status text.
    Status(String),
    /// Position or reading.
    Number(f64),
    /// Repetition index of an Active/Passive event.
    Index(u64),
}

impl EventValue {
    /// Numeric view of the payload. `Index` converts to `f64`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            EventValue::Number(v) => Some(*v),
            EventValue::Index(i) => Some(*i as f64),
            _ => None,
        }
    }
}

/// Receives events from elements and generators.
pub trait Listener: Send + Sync {
    /// Called once per delivered event. `source` is the emitter's name.
    fn event_received(&self, source: &str, event_type: EventType, value: &EventValue);
}

impl<F> Listener for F
where
    F: Fn(&str, EventType, &EventValue) + Send + Sync,
{
    fn event_received(&self, source: &str, event_type: EventType, value: &EventValue) {
        self(source, event_type, value)
    }
}

/// Compares listeners by data pointer, ignoring the vtable.
pub fn same_listener(a: &Arc<dyn Listener>, b: &Arc<dyn Listener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Listener list safe to mutate while events are being delivered.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
}

impl ListenerSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener. Returns `false` if it was already registered.
    pub fn add(&self, listener: Arc<dyn Listener>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn remove(&self, listener: &Arc<dyn Listener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// `true` when nobody listens.
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Clones the current listener list for delivery outside the lock.
    pub fn snapshot(&self) -> Vec<Arc<dyn Listener>> {
        self.listeners.read().clone()
    }

    /// Delivers an event to every listener unless it is suppressed.
    pub fn fire(&self, source: &str, event_type: EventType, value: &EventValue) {
        if event_type.propagation.is_suppressed() {
            return;
        }
        for listener in self.snapshot() {
            listener.event_received(source, event_type, value);
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}
