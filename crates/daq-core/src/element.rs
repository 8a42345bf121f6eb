//! Pool elements.
//!
//! A [`PoolElement`] is one axis of one controller as seen by actions: a
//! motor, a counter or a trigger/gate channel. It caches the last known
//! status and value and notifies two kinds of observers:
//!
//! - synchronous [`Listener`]s, honoring the event's [`Propagation`];
//! - async subscribers through a `tokio::sync::watch` channel.
//!
//! Listeners are always invoked after the element's lock is released.

use crate::controller::{Axis, Controller};
use crate::event::{EventKind, EventType, EventValue, Listener, ListenerSet, Propagation};
use crate::state::{ElementStatus, State};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// Role of an element within its controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Moveable axis.
    Motor,
    /// Counter or acquisition channel.
    Counter,
    /// Trigger/gate channel.
    TriggerGate,
}

impl ElementKind {
    /// Event kind used when the element's value changes.
    pub fn value_event(self) -> EventKind {
        match self {
            ElementKind::Motor => EventKind::Position,
            ElementKind::Counter | ElementKind::TriggerGate => EventKind::Value,
        }
    }
}

#[derive(Debug, Default)]
struct ElementInner {
    status: ElementStatus,
    value: Option<f64>,
    sent_state: Option<State>,
    sent_status: Option<String>,
    sent_value: Option<f64>,
}

/// One controller axis with cached status, value and observers.
pub struct PoolElement {
    name: String,
    kind: ElementKind,
    axis: Axis,
    controller: Arc<dyn Controller>,
    inner: Mutex<ElementInner>,
    status_tx: watch::Sender<ElementStatus>,
    listeners: ListenerSet,
}

fn should_send<T: PartialEq>(propagation: Propagation, last: &Option<T>, current: &T) -> bool {
    match propagation {
        Propagation::Suppress => false,
        Propagation::Propagate => last.as_ref() != Some(current),
        Propagation::PropagateSynchronously => true,
    }
}

impl PoolElement {
    /// Creates an element in `Unknown` state with no value.
    pub fn new(
        name: impl Into<String>,
        kind: ElementKind,
        axis: Axis,
        controller: Arc<dyn Controller>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ElementStatus::default());
        Self {
            name: name.into(),
            kind,
            axis,
            controller,
            inner: Mutex::new(ElementInner::default()),
            status_tx,
            listeners: ListenerSet::new(),
        }
    }

    /// Element name, unique in the pool.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element role.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Axis number on the controller.
    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Controller owning the axis.
    pub fn controller(&self) -> &Arc<dyn Controller> {
        &self.controller
    }

    /// Shorthand for `controller().name()`.
    pub fn controller_name(&self) -> &str {
        self.controller.name()
    }

    /// Last known status.
    pub fn status(&self) -> ElementStatus {
        self.inner.lock().status.clone()
    }

    /// Last known state.
    pub fn state(&self) -> State {
        self.inner.lock().status.state
    }

    /// Last known position or reading.
    pub fn value(&self) -> Option<f64> {
        self.inner.lock().value
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<ElementStatus> {
        self.status_tx.subscribe()
    }

    /// Registers a listener. Returns `false` if already registered.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) -> bool {
        self.listeners.add(listener)
    }

    /// Unregisters a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn Listener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Sets the state, keeping the current status text if the state is unchanged.
    pub fn set_state(&self, state: State, propagation: Propagation) {
        let status = {
            let inner = self.inner.lock();
            if inner.status.state == state {
                inner.status.clone()
            } else {
                ElementStatus::new(state)
            }
        };
        self.set_status(status, propagation);
    }

    /// Replaces state, status text and limit switches.
    pub fn set_status(&self, status: ElementStatus, propagation: Propagation) {
        let (send_state, send_status) = {
            let mut inner = self.inner.lock();
            inner.status = status.clone();
            let send_state = should_send(propagation, &inner.sent_state, &status.state);
            let send_status = should_send(propagation, &inner.sent_status, &status.status);
            if send_state {
                inner.sent_state = Some(status.state);
            }
            if send_status {
                inner.sent_status = Some(status.status.clone());
            }
            (send_state, send_status)
        };

        if !propagation.is_suppressed() {
            self.status_tx.send_if_modified(|current| {
                if *current == status {
                    return false;
                }
                *current = status.clone();
                true
            });
        }
        if send_state {
            self.listeners.fire(
                &self.name,
                EventType::new(EventKind::State, propagation),
                &EventValue::State(status.state),
            );
        }
        if send_status {
            self.listeners.fire(
                &self.name,
                EventType::new(EventKind::Status, propagation),
                &EventValue::Status(status.status),
            );
        }
    }

    /// Sets the position (motors) or value (counters, channels).
    pub fn set_value(&self, value: f64, propagation: Propagation) {
        let send = {
            let mut inner = self.inner.lock();
            inner.value = Some(value);
            let send = should_send(propagation, &inner.sent_value, &value);
            if send {
                inner.sent_value = Some(value);
            }
            send
        };
        if send {
            self.listeners.fire(
                &self.name,
                EventType::new(self.kind.value_event(), propagation),
                &EventValue::Number(value),
            );
        }
    }
}

impl std::fmt::Debug for PoolElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolElement")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("axis", &self.axis)
            .field("controller", &self.controller.name())
            .field("status", &self.status())
            .finish()
    }
}
