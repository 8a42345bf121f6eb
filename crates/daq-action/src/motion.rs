//! Motion action.
//!
//! Moves motors to their targets together. Positions are read on every poll
//! and propagated as Position events, which is what feeds position-domain
//! trigger generation while the motion runs.

use crate::action::{ActionState, ControllerAction};
use crate::config::ActionSettings;
use crate::context::ControllerRegistry;
use daq_core::element::PoolElement;
use daq_core::error::{AppResult, DaqError};
use daq_core::event::Propagation;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Moves a set of motors to absolute targets.
pub struct MotionAction {
    action: ControllerAction,
}

impl MotionAction {
    /// Creates an idle motion action.
    pub fn new(
        name: impl Into<String>,
        registry: Arc<ControllerRegistry>,
        settings: ActionSettings,
    ) -> Self {
        Self {
            action: ControllerAction::new(name, registry, settings),
        }
    }

    /// Underlying controller action.
    pub fn action(&self) -> &ControllerAction {
        &self.action
    }

    /// Adds a motor to the working set.
    pub fn add_element(&self, element: Arc<PoolElement>) {
        self.action.add_element(element);
    }

    /// Current action state.
    pub fn state(&self) -> ActionState {
        self.action.state()
    }

    /// Starts every motor towards its entry in `targets`.
    pub fn start_action(&self, targets: &BTreeMap<String, f64>) -> AppResult<()> {
        let missing: Vec<String> = self
            .action
            .elements()
            .iter()
            .filter(|e| !targets.contains_key(e.name()))
            .map(|e| e.name().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DaqError::Configuration(format!(
                "no target position for {}",
                missing.join(", ")
            )));
        }
        info!(action = %self.action.name(), ?targets, "Starting motion");
        self.action.start_action(targets, |_, _| Ok(()))
    }

    /// Waits for the motion to end and returns the final positions.
    pub fn action_loop(&self) -> AppResult<BTreeMap<String, f64>> {
        let mut last = BTreeMap::new();
        self.action.action_loop(|action, _, is_final| {
            let propagation = if is_final {
                Propagation::PropagateSynchronously
            } else {
                Propagation::Propagate
            };
            last = action.read_values(propagation);
        })?;
        Ok(last)
    }

    /// Starts the motion and waits for it to end.
    pub fn move_to(&self, targets: &BTreeMap<String, f64>) -> AppResult<BTreeMap<String, f64>> {
        self.start_action(targets)?;
        self.action_loop()
    }

    /// Stops every motor.
    pub fn stop_action(&self) -> AppResult<()> {
        self.action.stop_action()
    }

    /// Aborts every motor.
    pub fn abort_action(&self) -> AppResult<()> {
        self.action.abort_action()
    }

    /// See [`ControllerAction::wait_idle`].
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.action.wait_idle(timeout)
    }
}

impl std::fmt::Debug for MotionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MotionAction").field(&self.action).finish()
    }
}
