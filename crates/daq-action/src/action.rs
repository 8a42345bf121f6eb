//! Generic controller action.
//!
//! A [`ControllerAction`] drives the elements of one or several controllers
//! through the callback protocol in one coordinated pass:
//!
//! ```text
//!            start_action                action_loop
//!  Idle ──▶ Starting ──▶ InProgress ─────────────────▶ Finishing ──▶ Idle
//!              │              │                            ▲
//!              └──────────────┴──▶ Aborting ───────────────┘
//!                       stop_action / abort_action
//! ```
//!
//! # Ordering
//!
//! Controllers are visited in name order and the elements of a controller in
//! axis order. Within one controller every verb follows
//! `Pre<Verb>All → Pre<Verb>One… → <Verb>One… → <Verb>All`.
//!
//! # Failure isolation
//!
//! Every callback runs behind [`call`], which turns both errors and panics
//! into a [`CallbackError`], logs controller, verb and axis, and lets the
//! caller mark the affected elements `Fault`. Sibling elements and controllers
//! continue.
//!
//! # Partial start
//!
//! Starting is not transactional. When some axes start and others do not,
//! whether on the same controller or on different ones, `start_action`
//! returns [`DaqError::PartialStart`] and the action stays in progress with
//! every started axis reported `Moving`, so the caller can abort and then run
//! `action_loop` to finish it. Controllers with a started axis stay claimed
//! until then.

use crate::config::ActionSettings;
use crate::context::{ActionContext, ControllerRegistry};
use daq_core::cancel::CancelToken;
use daq_core::controller::{Axis, Controller, DriverResult};
use daq_core::element::PoolElement;
use daq_core::error::{AppResult, CallbackError, DaqError, DriverError, DriverErrorKind, StartFailure};
use daq_core::event::Propagation;
use daq_core::state::{ElementStatus, State};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn};

// =============================================================================
// Action State
// =============================================================================

/// Lifecycle of a [`ControllerAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    /// No action running
    Idle,
    /// Start protocol in progress
    Starting,
    /// Elements started, waiting for them to finish
    InProgress,
    /// Final states being propagated and finish hooks run
    Finishing,
    /// Stop or abort requested
    Aborting,
}

impl ActionState {
    /// `true` for every state except `Idle`.
    pub fn is_running(self) -> bool {
        !matches!(self, ActionState::Idle)
    }
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionState::Idle => write!(f, "idle"),
            ActionState::Starting => write!(f, "starting"),
            ActionState::InProgress => write!(f, "in progress"),
            ActionState::Finishing => write!(f, "finishing"),
            ActionState::Aborting => write!(f, "aborting"),
        }
    }
}

/// Element name → resolved status, as returned by a state poll.
pub type StateMap = BTreeMap<String, ElementStatus>;

/// Elements of one controller, sorted by axis.
#[derive(Clone)]
pub struct ControllerGroup {
    /// Controller shared by the elements.
    pub controller: Arc<dyn Controller>,
    /// Elements in axis order.
    pub elements: Vec<Arc<PoolElement>>,
}

// =============================================================================
// Callback isolation
// =============================================================================

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one controller callback, converting errors and panics.
pub fn call<T>(
    controller: &dyn Controller,
    verb: &'static str,
    axis: Option<Axis>,
    f: impl FnOnce() -> DriverResult<T>,
) -> Result<T, CallbackError> {
    let source = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(source)) => source,
        Err(payload) => DriverError::new(
            controller.name(),
            DriverErrorKind::Unknown,
            format!("callback panicked: {}", panic_message(payload.as_ref())),
        ),
    };
    error!(
        controller = %controller.name(),
        verb,
        axis = ?axis,
        error = %source,
        "Controller callback failed"
    );
    Err(CallbackError {
        controller: controller.name().to_string(),
        verb,
        axis,
        source,
    })
}

fn fault(element: &PoolElement, err: &CallbackError, propagation: Propagation) -> ElementStatus {
    let status = ElementStatus::fault(err.to_string());
    element.set_status(status.clone(), propagation);
    status
}

enum Failure {
    Refused { controller: String, axis: Axis },
    Callback(CallbackError),
}

/// Outcome of the start protocol on one controller.
struct ControllerStart {
    /// Elements whose `StartOne` succeeded, in axis order. They stay owned by
    /// the action even when a later callback of the controller fails.
    started: Vec<Arc<PoolElement>>,
    failure: Option<Failure>,
}

impl Failure {
    fn into_start_failure(self) -> StartFailure {
        match self {
            Failure::Refused { controller, axis } => StartFailure {
                controller,
                axis: Some(axis),
                reason: "start refused".into(),
            },
            Failure::Callback(err) => StartFailure {
                controller: err.controller.clone(),
                axis: err.axis,
                reason: err.to_string(),
            },
        }
    }

    fn into_error(self) -> DaqError {
        match self {
            Failure::Refused { controller, axis } => DaqError::ActionStart { controller, axis },
            Failure::Callback(err) => DaqError::ControllerCallback(err),
        }
    }
}

// =============================================================================
// Controller Action
// =============================================================================

/// Drives a working set of elements through the controller protocol.
///
/// One start at a time: `start_action` claims the controllers, `action_loop`
/// polls until every element stops and then releases them.
pub struct ControllerAction {
    name: String,
    registry: Arc<ControllerRegistry>,
    settings: ActionSettings,
    elements: RwLock<Vec<Arc<PoolElement>>>,
    state: Mutex<ActionState>,
    idle: Condvar,
    context: Mutex<Option<ActionContext>>,
    cancel: CancelToken,
    abort_requested: AtomicBool,
}

/// Finishes the action when the loop exits, including by panic.
struct FinishGuard<'a> {
    action: &'a ControllerAction,
    context: Option<ActionContext>,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.action.set_state(ActionState::Finishing);
        // Dropping the context runs finish hooks and releases the controllers.
        drop(self.context.take());
        self.action.set_state(ActionState::Idle);
    }
}

impl ControllerAction {
    /// Creates an idle action with an empty working set.
    pub fn new(
        name: impl Into<String>,
        registry: Arc<ControllerRegistry>,
        settings: ActionSettings,
    ) -> Self {
        Self {
            name: name.into(),
            registry,
            settings,
            elements: RwLock::new(Vec::new()),
            state: Mutex::new(ActionState::Idle),
            idle: Condvar::new(),
            context: Mutex::new(None),
            cancel: CancelToken::new(),
            abort_requested: AtomicBool::new(false),
        }
    }

    /// Action name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Poll and abort settings.
    pub fn settings(&self) -> &ActionSettings {
        &self.settings
    }

    /// Registry used to claim controllers.
    pub fn registry(&self) -> &Arc<ControllerRegistry> {
        &self.registry
    }

    // -------------------------------------------------------------------------
    // Working set
    // -------------------------------------------------------------------------

    /// Adds an element unless one with the same name is present.
    pub fn add_element(&self, element: Arc<PoolElement>) {
        let mut elements = self.elements.write();
        if !elements.iter().any(|e| e.name() == element.name()) {
            elements.push(element);
        }
    }

    /// Removes an element by name. Returns `false` if absent.
    pub fn remove_element(&self, name: &str) -> bool {
        let mut elements = self.elements.write();
        let before = elements.len();
        elements.retain(|e| e.name() != name);
        elements.len() != before
    }

    /// Replaces the working set.
    pub fn set_elements(&self, elements: Vec<Arc<PoolElement>>) {
        *self.elements.write() = elements;
    }

    /// Copy of the working set.
    pub fn elements(&self) -> Vec<Arc<PoolElement>> {
        self.elements.read().clone()
    }

    /// Working set partitioned by controller, controllers in name order and
    /// elements in axis order.
    pub fn controller_groups(&self) -> BTreeMap<String, ControllerGroup> {
        let mut groups: BTreeMap<String, ControllerGroup> = BTreeMap::new();
        for element in self.elements.read().iter() {
            groups
                .entry(element.controller_name().to_string())
                .or_insert_with(|| ControllerGroup {
                    controller: element.controller().clone(),
                    elements: Vec::new(),
                })
                .elements
                .push(element.clone());
        }
        for group in groups.values_mut() {
            group.elements.sort_by_key(|e| e.axis());
        }
        groups
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    /// Current action state.
    pub fn state(&self) -> ActionState {
        *self.state.lock()
    }

    /// `true` unless `Idle`.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    fn set_state(&self, state: ActionState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!(action = %self.name, from = %*current, to = %state, "Action state change");
        }
        *current = state;
        if state == ActionState::Idle {
            self.idle.notify_all();
        }
    }

    /// Blocks until the action is idle or `timeout` elapses.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.is_running() {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        !state.is_running()
    }

    /// Whether a started action is waiting for `action_loop`.
    pub fn has_pending_loop(&self) -> bool {
        self.context.lock().is_some()
    }

    /// `true` once stop or abort was requested for the current run.
    pub fn abort_requested(&self) -> bool {
        self.abort_requested.load(Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Start
    // -------------------------------------------------------------------------

    /// Starts every element of the working set.
    ///
    /// `values` gives the optional per-element start value (target position,
    /// integration time). `prepare` runs after the controllers are claimed and
    /// before the first start callback; finish hooks registered on the context
    /// run when the action ends, whether or not the start succeeds.
    pub fn start_action<F>(&self, values: &BTreeMap<String, f64>, prepare: F) -> AppResult<()>
    where
        F: FnOnce(&ActionContext, &BTreeMap<String, ControllerGroup>) -> AppResult<()>,
    {
        {
            let mut state = self.state.lock();
            if state.is_running() {
                return Err(DaqError::InvalidState(format!(
                    "action '{}' is {}",
                    self.name, *state
                )));
            }
            let groups_empty = self.elements.read().is_empty();
            if groups_empty {
                return Err(DaqError::Configuration(format!(
                    "action '{}' has no elements",
                    self.name
                )));
            }
            // Re-armed under the state lock, before Starting is published.
            self.cancel.reset();
            self.abort_requested.store(false, Ordering::SeqCst);
            *state = ActionState::Starting;
        }

        let groups = self.controller_groups();
        let context = match ActionContext::enter(self.registry.clone(), groups.keys().cloned().collect()) {
            Ok(context) => context,
            Err(e) => {
                self.set_state(ActionState::Idle);
                return Err(e);
            }
        };

        let span = info_span!("action", action = %self.name, action_id = %context.id());
        let _enter = span.enter();

        if let Err(e) = prepare(&context, &groups) {
            warn!(error = %e, "Action preparation failed");
            drop(context);
            self.set_state(ActionState::Idle);
            return Err(e);
        }

        let mut started_controllers = Vec::new();
        let mut started_elements = Vec::new();
        let mut failures = Vec::new();

        for (name, group) in &groups {
            let outcome = self.start_controller(group, values);
            if !outcome.started.is_empty() {
                started_controllers.push(name.clone());
                started_elements.extend(outcome.started);
            }
            failures.extend(outcome.failure);
        }

        if started_elements.is_empty() {
            drop(context);
            self.set_state(ActionState::Idle);
            let first = failures.into_iter().next().map(Failure::into_error);
            return Err(first.unwrap_or_else(|| {
                DaqError::InvalidState(format!("action '{}' started nothing", self.name))
            }));
        }

        *self.context.lock() = Some(context);
        {
            let mut state = self.state.lock();
            if *state == ActionState::Starting {
                *state = ActionState::InProgress;
            }
        }

        if failures.is_empty() {
            info!(
                controllers = started_controllers.len(),
                elements = started_elements.len(),
                "Action started"
            );
            Ok(())
        } else {
            let failed: Vec<StartFailure> =
                failures.into_iter().map(Failure::into_start_failure).collect();
            warn!(started = ?started_controllers, failed = failed.len(), "Action partially started");
            Err(DaqError::PartialStart {
                started: started_controllers,
                failed,
            })
        }
    }

    /// Runs the start protocol on one controller.
    ///
    /// A refusal or failure skips the remaining axes and `StartAll`. Axes
    /// already started are reported `Moving`; if `StartAll` itself fails they
    /// are reported `Fault` instead.
    fn start_controller(
        &self,
        group: &ControllerGroup,
        values: &BTreeMap<String, f64>,
    ) -> ControllerStart {
        let ctrl = group.controller.as_ref();

        if let Err(err) = call(ctrl, "PreStartAll", None, || ctrl.pre_start_all()) {
            for element in &group.elements {
                fault(element, &err, Propagation::PropagateSynchronously);
            }
            return ControllerStart {
                started: Vec::new(),
                failure: Some(Failure::Callback(err)),
            };
        }

        let mut started = Vec::with_capacity(group.elements.len());
        let mut failure = None;
        for element in &group.elements {
            let axis = element.axis();
            let value = values.get(element.name()).copied();

            match call(ctrl, "PreStartOne", Some(axis), || ctrl.pre_start_one(axis, value)) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(controller = %ctrl.name(), axis, "Controller refused to start axis");
                    failure = Some(Failure::Refused {
                        controller: ctrl.name().to_string(),
                        axis,
                    });
                    break;
                }
                Err(err) => {
                    fault(element, &err, Propagation::PropagateSynchronously);
                    failure = Some(Failure::Callback(err));
                    break;
                }
            }

            if let Err(err) = call(ctrl, "StartOne", Some(axis), || ctrl.start_one(axis, value)) {
                fault(element, &err, Propagation::PropagateSynchronously);
                failure = Some(Failure::Callback(err));
                break;
            }
            started.push(element.clone());
        }

        if failure.is_none() {
            if let Err(err) = call(ctrl, "StartAll", None, || ctrl.start_all()) {
                for element in &started {
                    fault(element, &err, Propagation::PropagateSynchronously);
                }
                return ControllerStart {
                    started,
                    failure: Some(Failure::Callback(err)),
                };
            }
        } else if !started.is_empty() {
            warn!(
                controller = %ctrl.name(),
                started = started.len(),
                "Controller partially started, its started axes stay in the action"
            );
        }

        for element in &started {
            element.set_state(State::Moving, Propagation::PropagateSynchronously);
        }
        ControllerStart { started, failure }
    }

    // -------------------------------------------------------------------------
    // State and value reads
    // -------------------------------------------------------------------------

    /// Polls the state of every element and stores it with `propagation`.
    pub fn read_state(&self, propagation: Propagation) -> StateMap {
        let mut states = StateMap::new();
        for group in self.controller_groups().values() {
            let ctrl = group.controller.as_ref();

            if let Err(err) = call(ctrl, "PreStateAll", None, || ctrl.pre_state_all()) {
                for element in &group.elements {
                    states.insert(element.name().to_string(), fault(element, &err, propagation));
                }
                continue;
            }

            let mut polled = Vec::with_capacity(group.elements.len());
            for element in &group.elements {
                let axis = element.axis();
                match call(ctrl, "PreStateOne", Some(axis), || ctrl.pre_state_one(axis)) {
                    Ok(()) => polled.push(element),
                    Err(err) => {
                        states.insert(element.name().to_string(), fault(element, &err, propagation));
                    }
                }
            }

            if let Err(err) = call(ctrl, "StateAll", None, || ctrl.state_all()) {
                for element in polled {
                    states.insert(element.name().to_string(), fault(element, &err, propagation));
                }
                continue;
            }

            for element in polled {
                let axis = element.axis();
                let status = match call(ctrl, "StateOne", Some(axis), || ctrl.state_one(axis)) {
                    Ok(report) => {
                        let status = report.resolve();
                        element.set_status(status.clone(), propagation);
                        status
                    }
                    Err(err) => fault(element, &err, propagation),
                };
                states.insert(element.name().to_string(), status);
            }
        }
        states
    }

    /// Reads the value of every element and stores it with `propagation`.
    ///
    /// Elements whose read fails are left out of the result.
    pub fn read_values(&self, propagation: Propagation) -> BTreeMap<String, f64> {
        let mut values = BTreeMap::new();
        for group in self.controller_groups().values() {
            let ctrl = group.controller.as_ref();
            if call(ctrl, "PreReadAll", None, || ctrl.pre_read_all()).is_err() {
                continue;
            }

            let mut polled = Vec::with_capacity(group.elements.len());
            for element in &group.elements {
                let axis = element.axis();
                if call(ctrl, "PreReadOne", Some(axis), || ctrl.pre_read_one(axis)).is_ok() {
                    polled.push(element);
                }
            }

            if call(ctrl, "ReadAll", None, || ctrl.read_all()).is_err() {
                continue;
            }

            for element in polled {
                let axis = element.axis();
                if let Ok(value) = call(ctrl, "ReadOne", Some(axis), || ctrl.read_one(axis)) {
                    element.set_value(value, propagation);
                    values.insert(element.name().to_string(), value);
                }
            }
        }
        values
    }

    // -------------------------------------------------------------------------
    // Action loop
    // -------------------------------------------------------------------------

    /// Polls until no element is moving, then finishes the action.
    ///
    /// `on_poll` is called after every state poll with the states and whether
    /// this is the final poll. Intermediate states are stored without
    /// propagation; final states are propagated synchronously before the
    /// finish hooks run. After an abort, polling is bounded by
    /// `abort_retries`: elements still moving are forced to `Fault` and
    /// [`DaqError::AbortTimeout`] is returned.
    pub fn action_loop<F>(&self, on_poll: F) -> AppResult<()>
    where
        F: FnMut(&ControllerAction, &StateMap, bool),
    {
        let context = self.context.lock().take().ok_or_else(|| {
            DaqError::InvalidState(format!("action '{}' has nothing to wait for", self.name))
        })?;
        self.run_loop(context, on_poll)
    }

    fn run_loop<F>(&self, context: ActionContext, mut on_poll: F) -> AppResult<()>
    where
        F: FnMut(&ControllerAction, &StateMap, bool),
    {
        let span = info_span!("action", action = %self.name, action_id = %context.id());
        let _enter = span.enter();
        let _finish = FinishGuard {
            action: self,
            context: Some(context),
        };

        let started = Instant::now();
        let mut polls: u64 = 0;
        let mut polls_after_abort: u32 = 0;

        let (mut states, result) = loop {
            let states = self.read_state(Propagation::Suppress);
            polls += 1;

            let moving: Vec<String> = states
                .iter()
                .filter(|(_, s)| s.state.is_moving())
                .map(|(name, _)| name.clone())
                .collect();
            if moving.is_empty() {
                break (states, Ok(()));
            }

            if self.abort_requested() {
                polls_after_abort += 1;
                if polls_after_abort > self.settings.abort_retries {
                    error!(
                        retries = self.settings.abort_retries,
                        elements = ?moving,
                        "Elements still moving after abort"
                    );
                    break (
                        states,
                        Err(DaqError::AbortTimeout {
                            retries: self.settings.abort_retries,
                            elements: moving,
                        }),
                    );
                }
            }

            on_poll(self, &states, false);

            if self.cancel.wait_timeout(self.settings.nap) {
                // Woken by stop/abort: re-arm so later naps still pace the polls.
                self.cancel.reset();
            }
        };

        for status in states.values_mut() {
            if status.state.is_moving() {
                *status = ElementStatus::fault("did not stop after abort");
            }
        }
        on_poll(self, &states, true);

        for element in self.elements() {
            if let Some(status) = states.get(element.name()) {
                element.set_status(status.clone(), Propagation::PropagateSynchronously);
            }
        }

        info!(
            polls,
            elapsed_ms = started.elapsed().as_millis() as u64,
            aborted = self.abort_requested(),
            "Action finished"
        );
        result
    }

    // -------------------------------------------------------------------------
    // Stop / Abort
    // -------------------------------------------------------------------------

    fn request_abort(&self) {
        // Same lock as the re-arm in `start_action`.
        let mut state = self.state.lock();
        self.abort_requested.store(true, Ordering::SeqCst);
        if matches!(*state, ActionState::Starting | ActionState::InProgress) {
            *state = ActionState::Aborting;
        }
        self.cancel.cancel();
    }

    /// Stops every element. Safe to call while `action_loop` runs on another thread.
    pub fn stop_action(&self) -> AppResult<()> {
        info!(action = %self.name, "Stop requested");
        self.request_abort();
        self.halt(
            ["PreStopAll", "PreStopOne", "StopOne", "StopAll"],
            |c| c.pre_stop_all(),
            |c, a| c.pre_stop_one(a),
            |c, a| c.stop_one(a),
            |c| c.stop_all(),
        )
    }

    /// Aborts every element. Safe to call while `action_loop` runs on another thread.
    pub fn abort_action(&self) -> AppResult<()> {
        warn!(action = %self.name, "Abort requested");
        self.request_abort();
        self.halt(
            ["PreAbortAll", "PreAbortOne", "AbortOne", "AbortAll"],
            |c| c.pre_abort_all(),
            |c, a| c.pre_abort_one(a),
            |c, a| c.abort_one(a),
            |c| c.abort_all(),
        )
    }

    /// Aborts and waits for the action to finish.
    ///
    /// Finishes the action itself when a start is pending and no loop is
    /// running, otherwise waits for the running loop.
    pub fn abort_and_wait(&self) -> AppResult<()> {
        let aborted = self.abort_action();
        // Taken once: a loop started elsewhere in between owns the context.
        let pending = self.context.lock().take();
        if let Some(context) = pending {
            self.run_loop(context, |_, _, _| {})?;
        } else if !self.wait_idle(self.settings.abort_timeout() * 2) {
            let elements = self
                .elements()
                .iter()
                .filter(|e| e.state().is_moving())
                .map(|e| e.name().to_string())
                .collect();
            return Err(DaqError::AbortTimeout {
                retries: self.settings.abort_retries,
                elements,
            });
        }
        aborted
    }

    fn halt(
        &self,
        verbs: [&'static str; 4],
        pre_all: impl Fn(&dyn Controller) -> DriverResult<()>,
        pre_one: impl Fn(&dyn Controller, Axis) -> DriverResult<()>,
        one: impl Fn(&dyn Controller, Axis) -> DriverResult<()>,
        all: impl Fn(&dyn Controller) -> DriverResult<()>,
    ) -> AppResult<()> {
        let [pre_all_verb, pre_one_verb, one_verb, all_verb] = verbs;
        let mut first_error = None;

        for group in self.controller_groups().values() {
            let ctrl = group.controller.as_ref();
            let mut record = |err: CallbackError, elements: &[&Arc<PoolElement>]| {
                for element in elements {
                    fault(element, &err, Propagation::Propagate);
                }
                first_error.get_or_insert(err);
            };

            if let Err(err) = call(ctrl, pre_all_verb, None, || pre_all(ctrl)) {
                record(err, &group.elements.iter().collect::<Vec<_>>());
                continue;
            }

            let mut halted = Vec::with_capacity(group.elements.len());
            for element in &group.elements {
                let axis = element.axis();
                let result = call(ctrl, pre_one_verb, Some(axis), || pre_one(ctrl, axis))
                    .and_then(|()| call(ctrl, one_verb, Some(axis), || one(ctrl, axis)));
                match result {
                    Ok(()) => halted.push(element),
                    Err(err) => record(err, &[element]),
                }
            }

            if let Err(err) = call(ctrl, all_verb, None, || all(ctrl)) {
                record(err, &halted);
            }
        }

        match first_error {
            Some(err) => Err(DaqError::ControllerCallback(err)),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ControllerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerAction")
            .field("name", &self.name)
            .field("state", &self.state())
            .field(
                "elements",
                &self
                    .elements
                    .read()
                    .iter()
                    .map(|e| e.name().to_string())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
