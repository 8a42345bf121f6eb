//! Mock counter/timer controller.
//!
//! Each axis integrates a constant count rate for the integration time given
//! as the start value. Counting starts for every pending axis in `StartAll`.

use crate::common::{ErrorConfig, MockRng};
use daq_core::controller::{Axis, Controller, DriverResult};
use daq_core::error::DriverError;
use daq_core::state::{State, StateReport};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Configuration for MockCounterController
#[derive(Debug, Clone, Deserialize)]
pub struct MockCounterConfig {
    /// Count rate per second (default: 1000.0)
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Integration time used when no start value is given (default: 100ms)
    #[serde(default = "default_integration", with = "humantime_serde")]
    pub default_integration: Duration,
    /// Relative noise amplitude of the final count (default: 0.0)
    #[serde(default)]
    pub noise: f64,
}

fn default_rate() -> f64 {
    1000.0
}

fn default_integration() -> Duration {
    Duration::from_millis(100)
}

impl Default for MockCounterConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            default_integration: default_integration(),
            noise: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct CounterAxis {
    integration: Duration,
    started: Option<Instant>,
    pending: Option<Duration>,
    /// Counting time already accumulated by a stopped acquisition.
    frozen: Option<Duration>,
}

impl CounterAxis {
    fn elapsed(&self, now: Instant) -> Duration {
        match (self.started, self.frozen) {
            (_, Some(frozen)) => frozen,
            (Some(started), None) => now.saturating_duration_since(started).min(self.integration),
            (None, None) => Duration::ZERO,
        }
    }

    fn is_counting(&self, now: Instant) -> bool {
        self.frozen.is_none()
            && self
                .started
                .is_some_and(|s| now.saturating_duration_since(s) < self.integration)
    }
}

/// Simulated counter controller.
///
/// Each started axis integrates for the configured time, then reports its count.
pub struct MockCounterController {
    name: String,
    config: MockCounterConfig,
    errors: ErrorConfig,
    rng: MockRng,
    axes: Mutex<BTreeMap<Axis, CounterAxis>>,
}

impl MockCounterController {
    /// Counter with default timing and no injected failures.
    pub fn new(name: impl Into<String>, axes: impl IntoIterator<Item = Axis>) -> Self {
        Self::with_config(name, axes, MockCounterConfig::default(), ErrorConfig::none())
    }

    /// Counter with explicit timing and failure scenarios.
    pub fn with_config(
        name: impl Into<String>,
        axes: impl IntoIterator<Item = Axis>,
        config: MockCounterConfig,
        errors: ErrorConfig,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            errors,
            rng: MockRng::new(Some(0)),
            axes: Mutex::new(axes.into_iter().map(|a| (a, CounterAxis::default())).collect()),
        }
    }

    fn check(&self, operation: &'static str, axis: Option<Axis>) -> DriverResult<()> {
        self.errors.check_operation(&self.name, operation, axis)
    }

    fn with_axis<T>(&self, axis: Axis, f: impl FnOnce(&mut CounterAxis) -> T) -> DriverResult<T> {
        let mut axes = self.axes.lock();
        let counter = axes
            .get_mut(&axis)
            .ok_or_else(|| DriverError::unknown_axis(&self.name, axis))?;
        Ok(f(counter))
    }

    fn freeze(&self, axis: Axis) -> DriverResult<()> {
        self.with_axis(axis, |counter| {
            let now = Instant::now();
            if counter.is_counting(now) {
                counter.frozen = Some(counter.elapsed(now));
            }
            counter.pending = None;
        })
    }
}

impl Controller for MockCounterController {
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

    /// Refuses non-positive integration times.
    fn pre_start_one(&self, axis: Axis, value: Option<f64>) -> DriverResult<bool> {
        self.check("PreStartOne", Some(axis))?;
        Ok(value.map_or(true, |v| v.is_finite() && v > 0.0))
    }

    fn start_one(&self, axis: Axis, value: Option<f64>) -> DriverResult<()> {
        self.check("StartOne", Some(axis))?;
        let integration = value
            .and_then(|v| Duration::try_from_secs_f64(v).ok())
            .unwrap_or(self.config.default_integration);
        self.with_axis(axis, |counter| counter.pending = Some(integration))
    }

    fn start_all(&self) -> DriverResult<()> {
        self.check("StartAll", None)?;
        let now = Instant::now();
        for counter in self.axes.lock().values_mut() {
            if let Some(integration) = counter.pending.take() {
                counter.integration = integration;
                counter.started = Some(now);
                counter.frozen = None;
            }
        }
        Ok(())
    }

    fn state_one(&self, axis: Axis) -> DriverResult<StateReport> {
        self.check("StateOne", Some(axis))?;
        let counting = self.with_axis(axis, |counter| counter.is_counting(Instant::now()))?;
        Ok(if counting {
            StateReport::WithStatus(State::Moving, "Counting".into())
        } else {
            StateReport::WithStatus(State::On, "Idle".into())
        })
    }

    fn read_one(&self, axis: Axis) -> DriverResult<f64> {
        self.check("ReadOne", Some(axis))?;
        let elapsed = self.with_axis(axis, |counter| counter.elapsed(Instant::now()))?;
        Ok((self.config.rate * elapsed.as_secs_f64() * self.rng.noise(self.config.noise)).round())
    }

    fn stop_one(&self, axis: Axis) -> DriverResult<()> {
        self.check("StopOne", Some(axis))?;
        self.freeze(axis)
    }

    fn abort_one(&self, axis: Axis) -> DriverResult<()> {
        self.check("AbortOne", Some(axis))?;
        self.freeze(axis)
    }
}

impl std::fmt::Debug for MockCounterController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCounterController")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn start(ctrl: &MockCounterController, axis: Axis, integration: f64) {
        ctrl.pre_start_all().unwrap();
        assert!(ctrl.pre_start_one(axis, Some(integration)).unwrap());
        ctrl.start_one(axis, Some(integration)).unwrap();
        ctrl.start_all().unwrap();
    }

    #[test]
    fn test_counts_rate_times_integration() {
        let ctrl = MockCounterController::new("ctctrl", [1]);
        start(&ctrl, 1, 0.02);
        assert_eq!(ctrl.state_one(1).unwrap().state(), State::Moving);

        thread::sleep(Duration::from_millis(40));
        assert_eq!(ctrl.state_one(1).unwrap().state(), State::On);
        assert_eq!(ctrl.read_one(1).unwrap(), 20.0);
    }

    #[test]
    fn test_non_positive_integration_refused() {
        let ctrl = MockCounterController::new("ctctrl", [1]);
        assert!(!ctrl.pre_start_one(1, Some(0.0)).unwrap());
        assert!(!ctrl.pre_start_one(1, Some(-1.0)).unwrap());
        assert!(ctrl.pre_start_one(1, None).unwrap());
    }

    #[test]
    fn test_stop_freezes_count() {
        let ctrl = MockCounterController::new("ctctrl", [1]);
        start(&ctrl, 1, 10.0);
        thread::sleep(Duration::from_millis(20));
        ctrl.stop_one(1).unwrap();

        let counts = ctrl.read_one(1).unwrap();
        assert!(counts >= 20.0 && counts < 1000.0, "counts {}", counts);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ctrl.read_one(1).unwrap(), counts);
        assert_eq!(ctrl.state_one(1).unwrap().state(), State::On);
    }

    #[test]
    fn test_unknown_axis() {
        let ctrl = MockCounterController::new("ctctrl", [1]);
        assert!(ctrl.state_one(9).is_err());
        ctrl.add_device(9).unwrap();
        assert_eq!(ctrl.state_one(9).unwrap().state(), State::On);
        ctrl.delete_device(9).unwrap();
        assert!(ctrl.read_one(9).is_err());
    }
}
