//! Trigger/gate generation action.
//!
//! Starts trigger/gate channels with a common [`SynchronizationDescription`].
//! Before the start protocol runs, every channel is configured and, where the
//! controller supports it, wired to the caller's listener and to the position
//! feed of a moveable. Each wiring step registers a finish hook that undoes
//! it when the action ends.

use crate::action::{call, ActionState, ControllerAction, ControllerGroup, StateMap};
use crate::config::ActionSettings;
use crate::context::{ActionContext, ControllerRegistry};
use daq_core::element::PoolElement;
use daq_core::error::{AppResult, DaqError};
use daq_core::event::Listener;
use daq_core::synchronization::{interpret, Domain, SynchronizationDescription};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Starts trigger/gate channels from one synchronization description.
pub struct TGGenerationAction {
    action: ControllerAction,
}

impl TGGenerationAction {
    /// Creates an idle generation action.
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

    /// Adds a trigger/gate channel to the working set.
    pub fn add_element(&self, element: Arc<PoolElement>) {
        self.action.add_element(element);
    }

    /// Current action state.
    pub fn state(&self) -> ActionState {
        self.action.state()
    }

    /// Whether any channel is still generating.
    pub fn is_triggering(states: &StateMap) -> bool {
        states.values().any(|s| s.state.is_moving())
    }

    /// Configures and starts every channel.
    ///
    /// The description is validated before any controller is claimed or
    /// called, so an invalid description never reaches hardware. `listener`
    /// receives Active/Passive events of every channel; `moveable` feeds its
    /// position events to channels that generate in the position domain.
    ///
    /// The domain is resolved the way the channels resolve it: position when
    /// a moveable is given, time otherwise. A description that can only be
    /// generated in the position domain requires a moveable.
    pub fn start_action(
        &self,
        synchronization: &SynchronizationDescription,
        listener: Option<Arc<dyn Listener>>,
        moveable: Option<Arc<PoolElement>>,
    ) -> AppResult<()> {
        let preferred = if moveable.is_some() {
            Domain::Position
        } else {
            Domain::Time
        };
        let domain = interpret(synchronization, Some(preferred))?.domain();
        if domain == Domain::Position && moveable.is_none() {
            return Err(DaqError::Configuration(
                "position-domain synchronization needs a moveable to follow".into(),
            ));
        }
        debug!(?domain, "Synchronization validated");

        for element in self.action.elements() {
            if element.controller().as_synchronizable().is_none() {
                return Err(DaqError::Configuration(format!(
                    "controller '{}' of '{}' does not accept a synchronization",
                    element.controller_name(),
                    element.name()
                )));
            }
        }

        self.action.start_action(&BTreeMap::new(), |context, groups| {
            prepare_channels(context, groups, synchronization, listener, moveable)
        })
    }

    /// Waits until every channel has finished generating.
    pub fn action_loop(&self) -> AppResult<()> {
        let mut polls = 0u64;
        self.action.action_loop(|_, states, is_final| {
            polls += 1;
            if is_final {
                debug!(polls, triggering = Self::is_triggering(states), "Generation loop done");
            }
        })
    }

    /// Stops generation on every channel.
    pub fn stop_action(&self) -> AppResult<()> {
        self.action.stop_action()
    }

    /// Aborts generation on every channel.
    pub fn abort_action(&self) -> AppResult<()> {
        self.action.abort_action()
    }

    /// Aborts and waits for the channels to report a final state.
    pub fn abort_and_wait(&self) -> AppResult<()> {
        self.action.abort_and_wait()
    }

    /// See [`ControllerAction::wait_idle`].
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.action.wait_idle(timeout)
    }
}

fn prepare_channels(
    context: &ActionContext,
    groups: &BTreeMap<String, ControllerGroup>,
    synchronization: &SynchronizationDescription,
    listener: Option<Arc<dyn Listener>>,
    moveable: Option<Arc<PoolElement>>,
) -> AppResult<()> {
    let channels: BTreeMap<&str, (&str, u32)> = groups
        .iter()
        .flat_map(|(ctrl, group)| {
            group
                .elements
                .iter()
                .map(move |e| (e.name(), (ctrl.as_str(), e.axis())))
        })
        .collect();
    debug!(?channels, "Channel map");

    let mut position_fed = 0usize;
    for group in groups.values() {
        let controller = group.controller.clone();
        let ctrl = controller.as_ref();

        for element in &group.elements {
            let axis = element.axis();

            if let Some(capable) = ctrl.as_listener_capable() {
                if let Some(moveable) = &moveable {
                    if let Some(feed) = capable.position_listener(axis) {
                        moveable.add_listener(feed.clone());
                        position_fed += 1;
                        let moveable = moveable.clone();
                        let controller = controller.clone();
                        context.add_finish_hook(format!("detach feed {}", element.name()), move || {
                            moveable.remove_listener(&feed);
                            if let Some(capable) = controller.as_listener_capable() {
                                capable.release_position_listener(axis);
                            }
                        });
                    }
                }

                if let Some(listener) = &listener {
                    call(ctrl, "AddListener", Some(axis), || {
                        capable.add_listener(axis, listener.clone())
                    })?;
                    let listener = listener.clone();
                    let controller = controller.clone();
                    context.add_finish_hook(format!("remove listener {}", element.name()), move || {
                        if let Some(capable) = controller.as_listener_capable() {
                            if let Err(e) = capable.remove_listener(axis, &listener) {
                                warn!(controller = %controller.name(), axis, error = %e, "Listener removal failed");
                            }
                        }
                    });
                }
            } else if listener.is_some() {
                warn!(
                    controller = %ctrl.name(),
                    axis,
                    "Controller does not support listeners, events will not be delivered"
                );
            }

            let synchronizable = ctrl.as_synchronizable().ok_or_else(|| {
                DaqError::Configuration(format!(
                    "controller '{}' does not accept a synchronization",
                    ctrl.name()
                ))
            })?;
            call(ctrl, "SetConfiguration", Some(axis), || {
                synchronizable.set_configuration(axis, synchronization)
            })?;
        }
    }

    if moveable.is_some() && position_fed == 0 {
        warn!("No channel accepted the position feed of the moveable");
    }
    info!(
        channels = channels.len(),
        position_fed,
        repeats = synchronization.total_repeats(),
        "Channels configured"
    );
    Ok(())
}

impl std::fmt::Debug for TGGenerationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TGGenerationAction").field(&self.action).finish()
    }
}
