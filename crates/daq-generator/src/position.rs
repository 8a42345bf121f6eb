//! Position-driven generation.
//!
//! [`PositionGenerator`] is fed moveable positions through the [`Listener`]
//! trait and emits Active/Passive events when configured thresholds are
//! crossed. A cursor makes every threshold fire at most once per run; a single
//! position sample may satisfy several consecutive thresholds, which then fire
//! in order.

use daq_core::error::{AppResult, DaqError};
use daq_core::event::{same_listener, EventKind, EventType, EventValue, Listener, Propagation};
use daq_core::synchronization::{Edge, ThresholdEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Default)]
struct Inner {
    events: Vec<ThresholdEvent>,
    cursor: usize,
    generating: bool,
    listeners: Vec<Arc<dyn Listener>>,
    running: Vec<Arc<dyn Listener>>,
}

/// Position-domain trigger/gate generator.
///
/// Has no thread of its own: events fire from [`Listener::event_received`] calls
/// carrying the followed moveable's position.
pub struct PositionGenerator {
    name: String,
    inner: Mutex<Inner>,
}

impl PositionGenerator {
    /// Creates an unarmed generator with no thresholds.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Generator name, used as the event source.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replaces the thresholds. Fails while generating.
    pub fn configure(&self, events: Vec<ThresholdEvent>) -> AppResult<()> {
        let mut inner = self.inner.lock();
        if inner.generating {
            return Err(DaqError::InvalidState(format!(
                "position generator '{}' is generating",
                self.name
            )));
        }
        inner.events = events;
        inner.cursor = 0;
        Ok(())
    }

    /// Registers a listener for the next start. Duplicates are ignored.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) {
        let mut inner = self.inner.lock();
        if !inner.listeners.iter().any(|l| same_listener(l, &listener)) {
            inner.listeners.push(listener);
        }
    }

    /// Unregisters a listener. Takes effect on the next start.
    pub fn remove_listener(&self, listener: &Arc<dyn Listener>) {
        self.inner
            .lock()
            .listeners
            .retain(|l| !same_listener(l, listener));
    }

    /// Arms the generator. Nothing is armed for an empty configuration.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        inner.cursor = 0;
        inner.generating = !inner.events.is_empty();
        inner.running = inner.listeners.clone();
        debug!(
            generator = %self.name,
            thresholds = inner.events.len(),
            "Position generation armed"
        );
    }

    /// Disarms the generator.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.generating = false;
        inner.running.clear();
    }

    /// `true` while armed and thresholds remain.
    pub fn is_generating(&self) -> bool {
        self.inner.lock().generating
    }

    /// Index of the next threshold to be evaluated.
    pub fn cursor(&self) -> usize {
        self.inner.lock().cursor
    }

    /// Evaluates a position sample and fires every threshold it satisfies.
    pub fn feed(&self, position: f64) {
        let (due, listeners) = {
            let mut inner = self.inner.lock();
            if !inner.generating {
                return;
            }
            let mut due = Vec::new();
            while let Some(event) = inner.events.get(inner.cursor).copied() {
                if !event.comparison.is_satisfied(position, event.threshold) {
                    break;
                }
                due.push(event);
                inner.cursor += 1;
            }
            if inner.cursor >= inner.events.len() {
                inner.generating = false;
            }
            let listeners = if inner.generating {
                inner.running.clone()
            } else {
                std::mem::take(&mut inner.running)
            };
            (due, listeners)
        };

        for event in due {
            let kind = match event.edge {
                Edge::Active => EventKind::Active,
                Edge::Passive => EventKind::Passive,
            };
            trace!(generator = %self.name, position, threshold = event.threshold, ?kind, "Threshold crossed");
            let event_type = EventType::new(kind, Propagation::PropagateSynchronously);
            let value = EventValue::Index(event.id);
            for listener in &listeners {
                listener.event_received(&self.name, event_type, &value);
            }
        }
    }
}

impl Listener for PositionGenerator {
    fn event_received(&self, _source: &str, event_type: EventType, value: &EventValue) {
        if event_type.kind != EventKind::Position {
            return;
        }
        if let Some(position) = value.as_number() {
            self.feed(position);
        }
    }
}

impl std::fmt::Debug for PositionGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PositionGenerator")
            .field("name", &self.name)
            .field("thresholds", &inner.events.len())
            .field("cursor", &inner.cursor)
            .field("generating", &inner.generating)
            .finish()
    }
}
