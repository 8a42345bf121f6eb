//! Mock motor controller.
//!
//! Simulates constant-velocity motion. Targets are accepted in `StartOne` and
//! all pending axes begin moving together in `StartAll`. Positions are
//! computed from the elapsed time on every query, so no background thread is
//! needed. Reaching a travel limit is reported through limit switches.

use crate::common::ErrorConfig;
use daq_core::controller::{Axis, Controller, DriverResult};
use daq_core::error::{DriverError, DriverErrorKind};
use daq_core::state::{LimitSwitches, State, StateReport};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for MockMotorController
#[derive(Debug, Clone, Deserialize)]
pub struct MockMotorConfig {
    /// Velocity in user units per second (default: 10.0)
    #[serde(default = "default_velocity")]
    pub velocity: f64,
    /// Lower travel limit (default: -1000.0)
    #[serde(default = "default_min")]
    pub min_position: f64,
    /// Upper travel limit (default: 1000.0)
    #[serde(default = "default_max")]
    pub max_position: f64,
}

fn default_velocity() -> f64 {
    10.0
}

fn default_min() -> f64 {
    -1000.0
}

fn default_max() -> f64 {
    1000.0
}

impl Default for MockMotorConfig {
    fn default() -> Self {
        Self {
            velocity: default_velocity(),
            min_position: default_min(),
            max_position: default_max(),
        }
    }
}

// =============================================================================
// Motion model
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct MotorAxis {
    origin: f64,
    target: f64,
    started: Option<Instant>,
    pending: Option<f64>,
}

impl MotorAxis {
    /// Current position; settles the axis once the target is reached.
    fn update(&mut self, velocity: f64, now: Instant) -> f64 {
        let Some(started) = self.started else {
            return self.origin;
        };
        let distance = self.target - self.origin;
        let travelled = velocity * now.saturating_duration_since(started).as_secs_f64();
        if travelled >= distance.abs() {
            self.origin = self.target;
            self.started = None;
            self.origin
        } else {
            self.origin + distance.signum() * travelled
        }
    }

    fn freeze(&mut self, velocity: f64) {
        let position = self.update(velocity, Instant::now());
        self.origin = position;
        self.target = position;
        self.started = None;
        self.pending = None;
    }
}

/// Simulated motor controller moving at constant velocity.
pub struct MockMotorController {
    name: String,
    config: MockMotorConfig,
    errors: ErrorConfig,
    axes: Mutex<BTreeMap<Axis, MotorAxis>>,
}

impl MockMotorController {
    /// Motor with default velocity and no injected failures.
    pub fn new(name: impl Into<String>, axes: impl IntoIterator<Item = Axis>) -> Self {
        Self::with_config(name, axes, MockMotorConfig::default(), ErrorConfig::none())
    }

    /// Motor with explicit motion parameters and failure scenarios.
    pub fn with_config(
        name: impl Into<String>,
        axes: impl IntoIterator<Item = Axis>,
        config: MockMotorConfig,
        errors: ErrorConfig,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            errors,
            axes: Mutex::new(axes.into_iter().map(|a| (a, MotorAxis::default())).collect()),
        }
    }

    /// Places an idle axis at `position` without moving.
    pub fn set_position(&self, axis: Axis, position: f64) -> DriverResult<()> {
        let mut axes = self.axes.lock();
        let motor = axes
            .get_mut(&axis)
            .ok_or_else(|| DriverError::unknown_axis(&self.name, axis))?;
        *motor = MotorAxis {
            origin: position,
            target: position,
            ..MotorAxis::default()
        };
        Ok(())
    }

    fn check(&self, operation: &'static str, axis: Option<Axis>) -> DriverResult<()> {
        self.errors.check_operation(&self.name, operation, axis)
    }

    fn with_axis<T>(&self, axis: Axis, f: impl FnOnce(&mut MotorAxis) -> T) -> DriverResult<T> {
        let mut axes = self.axes.lock();
        let motor = axes
            .get_mut(&axis)
            .ok_or_else(|| DriverError::unknown_axis(&self.name, axis))?;
        Ok(f(motor))
    }

    fn limits_at(&self, position: f64) -> LimitSwitches {
        let mut limits = LimitSwitches::empty();
        if position <= self.config.min_position {
            limits |= LimitSwitches::LOWER;
        }
        if position >= self.config.max_position {
            limits |= LimitSwitches::UPPER;
        }
        if position.abs() < f64::EPSILON {
            limits |= LimitSwitches::HOME;
        }
        limits
    }
}

impl Controller for MockMotorController {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_device(&self, axis: Axis) -> DriverResult<()> {
        self.axes.lock().entry(axis).or_default();
        Ok(())
    }

    fn delete_device(&self, axis: Axis) -> DriverResult<()> {
        self.axes
            .lock()
            .remove(&axis)
            .map(|_| ())
            .ok_or_else(|| DriverError::unknown_axis(&self.name, axis))
    }

    fn pre_start_all(&self) -> DriverResult<()> {
        self.check("PreStartAll", None)
    }

    /// Refuses targets outside the travel range.
    fn pre_start_one(&self, axis: Axis, value: Option<f64>) -> DriverResult<bool> {
        self.check("PreStartOne", Some(axis))?;
        let target = value.ok_or_else(|| {
            DriverError::new(
                &self.name,
                DriverErrorKind::InvalidParameter,
                format!("axis {} needs a target position", axis),
            )
        })?;
        if !(self.config.min_position..=self.config.max_position).contains(&target) {
            debug!(controller = %self.name, axis, target, "Target outside travel range");
            return Ok(false);
        }
        Ok(true)
    }

    fn start_one(&self, axis: Axis, value: Option<f64>) -> DriverResult<()> {
        self.check("StartOne", Some(axis))?;
        self.with_axis(axis, |motor| motor.pending = value)
    }

    fn start_all(&self) -> DriverResult<()> {
        self.check("StartAll", None)?;
        let now = Instant::now();
        let velocity = self.config.velocity;
        for motor in self.axes.lock().values_mut() {
            if let Some(target) = motor.pending.take() {
                let position = motor.update(velocity, now);
                motor.origin = position;
                motor.target = target;
                motor.started = Some(now);
            }
        }
        Ok(())
    }

    fn state_one(&self, axis: Axis) -> DriverResult<StateReport> {
        self.check("StateOne", Some(axis))?;
        let velocity = self.config.velocity;
        let (position, moving) = self.with_axis(axis, |motor| {
            let position = motor.update(velocity, Instant::now());
            (position, motor.started.is_some())
        })?;

        let limits = self.limits_at(position);
        let report = if moving {
            StateReport::WithLimits(State::Moving, format!("Moving at {:.3}", position), limits)
        } else if limits.intersects(LimitSwitches::UPPER | LimitSwitches::LOWER) {
            StateReport::WithLimits(State::Alarm, "Limit switch active".into(), limits)
        } else {
            StateReport::WithLimits(State::On, "Stopped".into(), limits)
        };
        Ok(report)
    }

    fn read_one(&self, axis: Axis) -> DriverResult<f64> {
        self.check("ReadOne", Some(axis))?;
        let velocity = self.config.velocity;
        self.with_axis(axis, |motor| motor.update(velocity, Instant::now()))
    }

    fn stop_one(&self, axis: Axis) -> DriverResult<()> {
        self.check("StopOne", Some(axis))?;
        let velocity = self.config.velocity;
        self.with_axis(axis, |motor| motor.freeze(velocity))
    }

    fn abort_one(&self, axis: Axis) -> DriverResult<()> {
        self.check("AbortOne", Some(axis))?;
        let velocity = self.config.velocity;
        self.with_axis(axis, |motor| motor.freeze(velocity))
    }
}

impl std::fmt::Debug for MockMotorController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockMotorController")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorScenario;
    use std::thread;
    use std::time::Duration;

    fn fast_motor() -> MockMotorController {
        MockMotorController::with_config(
            "motctrl",
            [1, 2],
            MockMotorConfig {
                velocity: 100.0,
                min_position: -10.0,
                max_position: 10.0,
            },
            ErrorConfig::none(),
        )
    }

    fn move_to(ctrl: &MockMotorController, axis: Axis, target: f64) {
        ctrl.pre_start_all().unwrap();
        assert!(ctrl.pre_start_one(axis, Some(target)).unwrap());
        ctrl.start_one(axis, Some(target)).unwrap();
        ctrl.start_all().unwrap();
    }

    #[test]
    fn test_motion_reaches_target() {
        let ctrl = fast_motor();
        move_to(&ctrl, 1, 2.0);
        assert_eq!(ctrl.state_one(1).unwrap().state(), State::Moving);

        thread::sleep(Duration::from_millis(40));
        assert_eq!(ctrl.read_one(1).unwrap(), 2.0);
        assert_eq!(ctrl.state_one(1).unwrap().state(), State::On);
    }

    #[test]
    fn test_target_outside_range_refused() {
        let ctrl = fast_motor();
        assert!(!ctrl.pre_start_one(1, Some(11.0)).unwrap());
        assert!(ctrl.pre_start_one(1, None).is_err());
    }

    #[test]
    fn test_limit_switch_reported() {
        let ctrl = fast_motor();
        move_to(&ctrl, 2, 10.0);
        thread::sleep(Duration::from_millis(150));
        let status = ctrl.state_one(2).unwrap().resolve();
        assert_eq!(status.state, State::Alarm);
        assert!(status.limits.contains(LimitSwitches::UPPER));
    }

    #[test]
    fn test_abort_freezes_position() {
        let ctrl = MockMotorController::with_config(
            "motctrl",
            [1],
            MockMotorConfig {
                velocity: 1.0,
                ..MockMotorConfig::default()
            },
            ErrorConfig::none(),
        );
        move_to(&ctrl, 1, 100.0);
        thread::sleep(Duration::from_millis(30));
        ctrl.abort_one(1).unwrap();

        let frozen = ctrl.read_one(1).unwrap();
        assert!(frozen > 0.0 && frozen < 1.0, "frozen at {}", frozen);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ctrl.read_one(1).unwrap(), frozen);
        assert_eq!(ctrl.state_one(1).unwrap().state(), State::On);
    }

    #[test]
    fn test_injected_state_failure() {
        let ctrl = MockMotorController::with_config(
            "motctrl",
            [1],
            MockMotorConfig::default(),
            ErrorConfig::scenario(ErrorScenario::FailOnAxis {
                operation: "StateOne",
                axis: 1,
            }),
        );
        let err = ctrl.state_one(1).unwrap_err();
        assert_eq!(err.driver_type, "motctrl");
    }
}
