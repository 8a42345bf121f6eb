//! Software trigger/gate controller.
//!
//! Each axis owns a time-domain [`FunctionGenerator`] and a
//! [`PositionGenerator`]. The synchronization description is stored verbatim
//! by `set_configuration` and interpreted at `pre_start_one`: position
//! generation is used when a position feed was requested through
//! [`ListenerCapable::position_listener`], time generation otherwise.

use crate::config::GeneratorSettings;
use crate::function_generator::FunctionGenerator;
use crate::position::PositionGenerator;
use daq_core::controller::{
    Axis, Controller, DriverResult, ListenerCapable, Synchronizable,
};
use daq_core::error::{DaqError, DriverError, DriverErrorKind};
use daq_core::event::Listener;
use daq_core::state::{State, StateReport};
use daq_core::synchronization::{
    interpret, Domain, GeneratorConfiguration, SynchronizationDescription,
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct AxisConfig {
    description: Option<SynchronizationDescription>,
    position_fed: bool,
    domain: Option<Domain>,
}

struct TgAxis {
    time: FunctionGenerator,
    position: Arc<PositionGenerator>,
    config: Mutex<AxisConfig>,
}

impl TgAxis {
    fn new(name: &str, settings: GeneratorSettings) -> Self {
        Self {
            time: FunctionGenerator::new(name, settings),
            position: Arc::new(PositionGenerator::new(name)),
            config: Mutex::new(AxisConfig::default()),
        }
    }

    fn is_generating(&self) -> bool {
        match self.config.lock().domain {
            Some(Domain::Position) => self.position.is_generating(),
            Some(_) => self.time.is_generating(),
            None => false,
        }
    }

    fn stop(&self) {
        self.time.stop();
        self.position.stop();
    }
}

/// Trigger/gate controller whose axes are software generators.
///
/// Each axis owns a [`FunctionGenerator`] for the time domain and a
/// [`PositionGenerator`] for the position domain.
pub struct SoftwareTriggerGateController {
    name: String,
    settings: GeneratorSettings,
    axes: RwLock<BTreeMap<Axis, Arc<TgAxis>>>,
}

impl SoftwareTriggerGateController {
    /// Creates a controller with no axes.
    pub fn new(name: impl Into<String>, settings: GeneratorSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            axes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Creates the controller with the given axes already added.
    pub fn with_axes(
        name: impl Into<String>,
        settings: GeneratorSettings,
        axes: impl IntoIterator<Item = Axis>,
    ) -> Self {
        let controller = Self::new(name, settings);
        {
            let mut map = controller.axes.write();
            for axis in axes {
                let axis_name = format!("{}.{}", controller.name, axis);
                map.insert(axis, Arc::new(TgAxis::new(&axis_name, settings)));
            }
        }
        controller
    }

    fn axis(&self, axis: Axis) -> DriverResult<Arc<TgAxis>> {
        self.axes
            .read()
            .get(&axis)
            .cloned()
            .ok_or_else(|| DriverError::unknown_axis(&self.name, axis))
    }

    fn config_error(&self, err: DaqError) -> DriverError {
        DriverError::new(&self.name, DriverErrorKind::Configuration, err.to_string())
    }

    /// Active events emitted by the time generator of `axis` in its last run.
    pub fn active_events_fired(&self, axis: Axis) -> DriverResult<u64> {
        Ok(self.axis(axis)?.time.active_events_fired())
    }

    /// Domain chosen for `axis` at the last start.
    pub fn active_domain(&self, axis: Axis) -> DriverResult<Option<Domain>> {
        Ok(self.axis(axis)?.config.lock().domain)
    }
}

impl Controller for SoftwareTriggerGateController {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_device(&self, axis: Axis) -> DriverResult<()> {
        let axis_name = format!("{}.{}", self.name, axis);
        self.axes
            .write()
            .entry(axis)
            .or_insert_with(|| Arc::new(TgAxis::new(&axis_name, self.settings)));
        debug!(controller = %self.name, axis, "Axis added");
        Ok(())
    }

    fn delete_device(&self, axis: Axis) -> DriverResult<()> {
        let removed = self.axes.write().remove(&axis);
        match removed {
            Some(tg) => {
                tg.stop();
                debug!(controller = %self.name, axis, "Axis deleted");
                Ok(())
            }
            None => Err(DriverError::unknown_axis(&self.name, axis)),
        }
    }

    fn pre_start_one(&self, axis: Axis, _value: Option<f64>) -> DriverResult<bool> {
        let tg = self.axis(axis)?;
        let mut config = tg.config.lock();
        let Some(description) = config.description.as_ref() else {
            warn!(controller = %self.name, axis, "Axis has no synchronization configured");
            return Ok(false);
        };

        let preferred = if config.position_fed {
            Domain::Position
        } else {
            Domain::Time
        };
        let generator_config =
            interpret(description, Some(preferred)).map_err(|e| self.config_error(e))?;
        let domain = generator_config.domain();

        match generator_config {
            GeneratorConfiguration::Time(schedule) => {
                tg.time.configure(schedule);
                tg.time.prepare().map_err(|e| self.config_error(e))?;
            }
            GeneratorConfiguration::Position(events) => {
                if !config.position_fed {
                    warn!(controller = %self.name, axis, "Position generation without a position feed");
                    return Ok(false);
                }
                tg.position
                    .configure(events)
                    .map_err(|e| self.config_error(e))?;
            }
        }
        config.domain = Some(domain);
        Ok(true)
    }

    fn start_one(&self, axis: Axis, _value: Option<f64>) -> DriverResult<()> {
        let tg = self.axis(axis)?;
        let domain = tg.config.lock().domain;
        match domain {
            Some(Domain::Position) => tg.position.start(),
            Some(_) => tg.time.start().map_err(|e| match e {
                DaqError::Driver(driver) => driver,
                other => self.config_error(other),
            })?,
            None => {
                return Err(DriverError::new(
                    &self.name,
                    DriverErrorKind::Configuration,
                    format!("axis {} was not prepared", axis),
                ))
            }
        }
        info!(controller = %self.name, axis, ?domain, "Trigger/gate started");
        Ok(())
    }

    fn state_one(&self, axis: Axis) -> DriverResult<StateReport> {
        let tg = self.axis(axis)?;
        Ok(if tg.is_generating() {
            StateReport::WithStatus(State::Moving, "Generating".into())
        } else {
            StateReport::WithStatus(State::On, "Idle".into())
        })
    }

    fn stop_one(&self, axis: Axis) -> DriverResult<()> {
        self.axis(axis)?.stop();
        Ok(())
    }

    fn abort_one(&self, axis: Axis) -> DriverResult<()> {
        self.axis(axis)?.stop();
        Ok(())
    }

    fn as_synchronizable(&self) -> Option<&dyn Synchronizable> {
        Some(self)
    }

    fn as_listener_capable(&self) -> Option<&dyn ListenerCapable> {
        Some(self)
    }
}

impl Synchronizable for SoftwareTriggerGateController {
    fn set_configuration(
        &self,
        axis: Axis,
        description: &SynchronizationDescription,
    ) -> DriverResult<()> {
        interpret(description, None).map_err(|e| self.config_error(e))?;
        let tg = self.axis(axis)?;
        tg.config.lock().description = Some(description.clone());
        debug!(
            controller = %self.name,
            axis,
            groups = description.groups().len(),
            "Synchronization configured"
        );
        Ok(())
    }

    fn get_configuration(&self, axis: Axis) -> DriverResult<SynchronizationDescription> {
        self.axis(axis)?
            .config
            .lock()
            .description
            .clone()
            .ok_or_else(|| {
                DriverError::new(
                    &self.name,
                    DriverErrorKind::Configuration,
                    format!("axis {} has no synchronization", axis),
                )
            })
    }
}

impl ListenerCapable for SoftwareTriggerGateController {
    fn add_listener(&self, axis: Axis, listener: Arc<dyn Listener>) -> DriverResult<()> {
        let tg = self.axis(axis)?;
        tg.time.add_listener(listener.clone());
        tg.position.add_listener(listener);
        Ok(())
    }

    fn remove_listener(&self, axis: Axis, listener: &Arc<dyn Listener>) -> DriverResult<()> {
        let tg = self.axis(axis)?;
        tg.time.remove_listener(listener);
        tg.position.remove_listener(listener);
        Ok(())
    }

    fn position_listener(&self, axis: Axis) -> Option<Arc<dyn Listener>> {
        let tg = self.axis(axis).ok()?;
        tg.config.lock().position_fed = true;
        let listener: Arc<dyn Listener> = tg.position.clone();
        Some(listener)
    }

    fn release_position_listener(&self, axis: Axis) {
        if let Ok(tg) = self.axis(axis) {
            tg.config.lock().position_fed = false;
        }
    }
}

impl std::fmt::Debug for SoftwareTriggerGateController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareTriggerGateController")
            .field("name", &self.name)
            .field("axes", &self.axes.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_core::synchronization::SynchronizationGroup;
    use std::time::Duration;

    fn controller() -> SoftwareTriggerGateController {
        SoftwareTriggerGateController::with_axes(
            "swtg",
            GeneratorSettings {
                max_nap: Duration::from_millis(10),
            },
            [1, 2],
        )
    }

    #[test]
    fn test_configuration_round_trip_is_exact() {
        let ctrl = controller();
        let description = SynchronizationDescription::new(vec![SynchronizationGroup::time(
            0.25, 0.1, 0.3, 7,
        )
        .with_initial(Domain::Position, 1.0)
        .with_active(Domain::Position, 0.5)
        .with_total(Domain::Position, 2.0)]);

        ctrl.set_configuration(1, &description).unwrap();
        assert_eq!(ctrl.get_configuration(1).unwrap(), description);
    }

    #[test]
    fn test_unconfigured_axis_refuses_start() {
        let ctrl = controller();
        assert!(!ctrl.pre_start_one(2, None).unwrap());
        assert!(ctrl.get_configuration(2).is_err());
    }

    #[test]
    fn test_invalid_description_rejected_at_set() {
        let ctrl = controller();
        let description = SynchronizationDescription::new(vec![
            SynchronizationGroup::time(0.0, 0.1, 0.2, 1),
            SynchronizationGroup::position(0.0, 0.1, 0.2, 1),
        ]);
        let err = ctrl.set_configuration(1, &description).unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Configuration);
    }

    #[test]
    fn test_time_generation_reports_moving_then_on() {
        let ctrl = controller();
        let description =
            SynchronizationDescription::new(vec![SynchronizationGroup::time(0.0, 0.01, 0.02, 3)]);
        ctrl.set_configuration(1, &description).unwrap();
        assert!(ctrl.pre_start_one(1, None).unwrap());
        ctrl.start_one(1, None).unwrap();
        assert_eq!(ctrl.state_one(1).unwrap().state(), State::Moving);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while ctrl.state_one(1).unwrap().state() == State::Moving {
            assert!(std::time::Instant::now() < deadline, "generation did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(ctrl.active_events_fired(1).unwrap(), 3);
        assert_eq!(ctrl.active_domain(1).unwrap(), Some(Domain::Time));
    }

    #[test]
    fn test_position_feed_selects_position_domain() {
        let ctrl = controller();
        let description = SynchronizationDescription::new(vec![SynchronizationGroup::time(
            0.0, 0.01, 0.02, 2,
        )
        .with_initial(Domain::Position, 0.0)
        .with_active(Domain::Position, 0.5)
        .with_total(Domain::Position, 1.0)]);
        ctrl.set_configuration(1, &description).unwrap();

        let feed = ctrl.position_listener(1).unwrap();
        assert!(ctrl.pre_start_one(1, None).unwrap());
        ctrl.start_one(1, None).unwrap();
        assert_eq!(ctrl.active_domain(1).unwrap(), Some(Domain::Position));
        assert_eq!(ctrl.state_one(1).unwrap().state(), State::Moving);

        feed.event_received(
            "mot01",
            daq_core::event::EventType::new(
                daq_core::event::EventKind::Position,
                daq_core::event::Propagation::Propagate,
            ),
            &daq_core::event::EventValue::Number(2.0),
        );
        assert_eq!(ctrl.state_one(1).unwrap().state(), State::On);

        ctrl.release_position_listener(1);
        assert!(ctrl.pre_start_one(1, None).unwrap());
        assert_eq!(ctrl.active_domain(1).unwrap(), Some(Domain::Time));
    }

    #[test]
    fn test_delete_device_stops_generation() {
        let ctrl = controller();
        let description =
            SynchronizationDescription::new(vec![SynchronizationGroup::time(0.0, 1.0, 2.0, 5)]);
        ctrl.set_configuration(2, &description).unwrap();
        ctrl.pre_start_one(2, None).unwrap();
        ctrl.start_one(2, None).unwrap();

        ctrl.delete_device(2).unwrap();
        assert!(ctrl.state_one(2).is_err());
        assert!(ctrl.delete_device(2).is_err());
    }
}
