//! Acquisition action.
//!
//! Runs timed acquisitions on counter elements. An acquisition can be run
//! directly with [`AcquisitionAction::run`] or per trigger: the listener
//! returned by [`AcquisitionAction::trigger_listener`] starts one acquisition
//! for every Active event it receives, on its own thread so the generator is
//! never blocked. A trigger that arrives while the previous acquisition is
//! still running is counted as skipped.

use crate::action::{ActionState, ControllerAction};
use crate::config::ActionSettings;
use crate::context::ControllerRegistry;
use daq_core::element::PoolElement;
use daq_core::error::{AppResult, DaqError};
use daq_core::event::{EventKind, EventType, EventValue, Listener, Propagation};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Trigger bookkeeping of an [`AcquisitionAction`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerStats {
    /// Active events that started an acquisition.
    pub triggered: u64,
    /// Active events dropped because an acquisition was running.
    pub skipped: u64,
    /// Acquisitions that finished cleanly.
    pub completed: u64,
    /// Acquisitions that ended with an error.
    pub failed: u64,
}

#[derive(Default)]
struct TriggerCounters {
    triggered: AtomicU64,
    skipped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Acquisition driven by trigger/gate Active events.
///
/// Each Active event starts one acquisition on the working set unless the
/// previous one is still running, in which case the event is counted as skipped.
pub struct AcquisitionAction {
    action: ControllerAction,
    busy: AtomicBool,
    counters: TriggerCounters,
    last_values: Mutex<BTreeMap<String, f64>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl AcquisitionAction {
    /// Creates an idle acquisition action.
    pub fn new(
        name: impl Into<String>,
        registry: Arc<ControllerRegistry>,
        settings: ActionSettings,
    ) -> Self {
        Self {
            action: ControllerAction::new(name, registry, settings),
            busy: AtomicBool::new(false),
            counters: TriggerCounters::default(),
            last_values: Mutex::new(BTreeMap::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Underlying controller action.
    pub fn action(&self) -> &ControllerAction {
        &self.action
    }

    /// Adds a counter to the working set.
    pub fn add_element(&self, element: Arc<PoolElement>) {
        self.action.add_element(element);
    }

    /// Current action state.
    pub fn state(&self) -> ActionState {
        self.action.state()
    }

    /// Counts every element for `integration` and returns the final values.
    pub fn run(&self, integration: Duration) -> AppResult<BTreeMap<String, f64>> {
        if integration.is_zero() {
            return Err(DaqError::Configuration(
                "integration time must be positive".into(),
            ));
        }
        let seconds = integration.as_secs_f64();
        let values: BTreeMap<String, f64> = self
            .action
            .elements()
            .iter()
            .map(|e| (e.name().to_string(), seconds))
            .collect();

        self.action.start_action(&values, |_, _| Ok(()))?;

        let mut last = BTreeMap::new();
        self.action.action_loop(|action, _, is_final| {
            let propagation = if is_final {
                Propagation::PropagateSynchronously
            } else {
                Propagation::Propagate
            };
            last = action.read_values(propagation);
        })?;
        *self.last_values.lock() = last.clone();
        Ok(last)
    }

    /// Values of the last completed acquisition.
    pub fn last_values(&self) -> BTreeMap<String, f64> {
        self.last_values.lock().clone()
    }

    /// `true` while an acquisition runs.
    pub fn is_acquiring(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Snapshot of the trigger counters.
    pub fn trigger_stats(&self) -> TriggerStats {
        TriggerStats {
            triggered: self.counters.triggered.load(Ordering::SeqCst),
            skipped: self.counters.skipped.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }

    /// Listener that starts an acquisition of `integration` on every Active event.
    ///
    /// The listener holds a weak reference, so registering it with a
    /// generator does not keep the action alive.
    pub fn trigger_listener(self: &Arc<Self>, integration: Duration) -> Arc<dyn Listener> {
        Arc::new(TriggerListener {
            action: Arc::downgrade(self),
            integration,
        })
    }

    fn on_trigger(self: Arc<Self>, integration: Duration, index: Option<f64>) {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.counters.skipped.fetch_add(1, Ordering::SeqCst);
            warn!(action = %self.action.name(), ?index, "Trigger skipped, acquisition still running");
            return;
        }
        self.counters.triggered.fetch_add(1, Ordering::SeqCst);

        let worker = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-trigger", self.action.name()))
            .spawn(move || {
                match worker.run(integration) {
                    Ok(values) => {
                        worker.counters.completed.fetch_add(1, Ordering::SeqCst);
                        debug!(action = %worker.action.name(), ?index, ?values, "Triggered acquisition done");
                    }
                    Err(e) => {
                        worker.counters.failed.fetch_add(1, Ordering::SeqCst);
                        error!(action = %worker.action.name(), ?index, error = %e, "Triggered acquisition failed");
                    }
                }
                worker.busy.store(false, Ordering::SeqCst);
            });

        match spawned {
            Ok(handle) => {
                let mut pending = self.pending.lock();
                pending.retain(|h| !h.is_finished());
                pending.push(handle);
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                self.busy.store(false, Ordering::SeqCst);
                error!(action = %self.action.name(), error = %e, "Failed to spawn acquisition thread");
            }
        }
    }

    /// Joins every triggered acquisition still running.
    pub fn join_pending(&self) {
        let handles = std::mem::take(&mut *self.pending.lock());
        for handle in handles {
            if handle.join().is_err() {
                error!(action = %self.action.name(), "Acquisition thread panicked");
            }
        }
    }

    /// Stops the running acquisition.
    pub fn stop_action(&self) -> AppResult<()> {
        self.action.stop_action()
    }

    /// Aborts the running acquisition.
    pub fn abort_action(&self) -> AppResult<()> {
        self.action.abort_action()
    }

    /// See [`ControllerAction::wait_idle`].
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.action.wait_idle(timeout)
    }
}

impl std::fmt::Debug for AcquisitionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionAction")
            .field("action", &self.action)
            .field("stats", &self.trigger_stats())
            .finish()
    }
}

struct TriggerListener {
    action: Weak<AcquisitionAction>,
    integration: Duration,
}

impl Listener for TriggerListener {
    fn event_received(&self, _source: &str, event_type: EventType, value: &EventValue) {
        if event_type.kind != EventKind::Active || event_type.propagation.is_suppressed() {
            return;
        }
        if let Some(action) = self.action.upgrade() {
            action.on_trigger(self.integration, value.as_number());
        }
    }
}
