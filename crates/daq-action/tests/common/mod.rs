//! Shared test utilities for action tests.
//!
//! - `RecordingController`: logs every callback into a shared call log and
//!   can refuse, fail, panic or stay moving on request
//! - `element`: builds a pool element on a controller axis

#![allow(dead_code)] // Utilities may not all be used in every test file

use daq_action::{ActionSettings, ControllerRegistry};
use daq_core::controller::{Axis, Controller, DriverResult};
use daq_core::element::{ElementKind, PoolElement};
use daq_core::error::{DriverError, DriverErrorKind};
use daq_core::state::{State, StateReport};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Fast polling for tests.
pub fn settings() -> ActionSettings {
    ActionSettings {
        nap: Duration::from_millis(5),
        abort_retries: 5,
    }
}

pub fn registry() -> Arc<ControllerRegistry> {
    Arc::new(ControllerRegistry::new())
}

#[derive(Default)]
struct Behaviour {
    refuse: HashSet<Axis>,
    fail: HashSet<(&'static str, Option<Axis>)>,
    panic: HashSet<(&'static str, Option<Axis>)>,
    /// StateOne polls reporting Moving after StartAll
    moving_polls: u32,
    /// Ignore stop and abort
    stuck: bool,
}

pub struct RecordingController {
    name: String,
    log: CallLog,
    behaviour: Mutex<Behaviour>,
    pending: Mutex<BTreeSet<Axis>>,
    moving: Mutex<BTreeMap<Axis, u32>>,
}

impl RecordingController {
    pub fn new(name: &str, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            log,
            behaviour: Mutex::new(Behaviour {
                moving_polls: 2,
                ..Behaviour::default()
            }),
            pending: Mutex::new(BTreeSet::new()),
            moving: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn refuse(self, axis: Axis) -> Self {
        self.behaviour.lock().refuse.insert(axis);
        self
    }

    pub fn fail(self, verb: &'static str, axis: Option<Axis>) -> Self {
        self.behaviour.lock().fail.insert((verb, axis));
        self
    }

    pub fn panic_on(self, verb: &'static str, axis: Option<Axis>) -> Self {
        self.behaviour.lock().panic.insert((verb, axis));
        self
    }

    pub fn moving_polls(self, polls: u32) -> Self {
        self.behaviour.lock().moving_polls = polls;
        self
    }

    pub fn stuck(self) -> Self {
        let mut behaviour = self.behaviour.lock();
        behaviour.stuck = true;
        behaviour.moving_polls = u32::MAX;
        drop(behaviour);
        self
    }

    fn record(&self, verb: &'static str, axis: Option<Axis>) -> DriverResult<()> {
        let entry = match axis {
            Some(axis) => format!("{}:{}({})", self.name, verb, axis),
            None => format!("{}:{}", self.name, verb),
        };
        self.log.lock().push(entry);

        let behaviour = self.behaviour.lock();
        if behaviour.panic.contains(&(verb, axis)) {
            drop(behaviour);
            panic!("{} panicked in {}", self.name, verb);
        }
        if behaviour.fail.contains(&(verb, axis)) {
            return Err(DriverError::new(
                &self.name,
                DriverErrorKind::Hardware,
                format!("{} rejected", verb),
            ));
        }
        Ok(())
    }

    fn halt(&self, axis: Axis) {
        if !self.behaviour.lock().stuck {
            self.moving.lock().remove(&axis);
        }
    }
}

impl Controller for RecordingController {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_start_all(&self) -> DriverResult<()> {
        self.pending.lock().clear();
        self.record("PreStartAll", None)
    }

    fn pre_start_one(&self, axis: Axis, _value: Option<f64>) -> DriverResult<bool> {
        self.record("PreStartOne", Some(axis))?;
        Ok(!self.behaviour.lock().refuse.contains(&axis))
    }

    fn start_one(&self, axis: Axis, _value: Option<f64>) -> DriverResult<()> {
        self.record("StartOne", Some(axis))?;
        self.pending.lock().insert(axis);
        Ok(())
    }

    fn start_all(&self) -> DriverResult<()> {
        self.record("StartAll", None)?;
        let polls = self.behaviour.lock().moving_polls;
        let mut moving = self.moving.lock();
        for axis in std::mem::take(&mut *self.pending.lock()) {
            moving.insert(axis, polls);
        }
        Ok(())
    }

    fn pre_state_all(&self) -> DriverResult<()> {
        self.record("PreStateAll", None)
    }

    fn pre_state_one(&self, axis: Axis) -> DriverResult<()> {
        self.record("PreStateOne", Some(axis))
    }

    fn state_all(&self) -> DriverResult<()> {
        self.record("StateAll", None)
    }

    fn state_one(&self, axis: Axis) -> DriverResult<StateReport> {
        self.record("StateOne", Some(axis))?;
        let mut moving = self.moving.lock();
        match moving.get_mut(&axis) {
            Some(0) => {
                moving.remove(&axis);
                Ok(State::On.into())
            }
            Some(left) => {
                *left = left.saturating_sub(1);
                Ok(State::Moving.into())
            }
            None => Ok(State::On.into()),
        }
    }

    fn read_one(&self, axis: Axis) -> DriverResult<f64> {
        self.record("ReadOne", Some(axis))?;
        Ok(f64::from(axis))
    }

    fn pre_stop_all(&self) -> DriverResult<()> {
        self.record("PreStopAll", None)
    }

    fn stop_one(&self, axis: Axis) -> DriverResult<()> {
        self.record("StopOne", Some(axis))?;
        self.halt(axis);
        Ok(())
    }

    fn stop_all(&self) -> DriverResult<()> {
        self.record("StopAll", None)
    }

    fn pre_abort_all(&self) -> DriverResult<()> {
        self.record("PreAbortAll", None)
    }

    fn abort_one(&self, axis: Axis) -> DriverResult<()> {
        self.record("AbortOne", Some(axis))?;
        self.halt(axis);
        Ok(())
    }

    fn abort_all(&self) -> DriverResult<()> {
        self.record("AbortAll", None)
    }
}

pub fn element(name: &str, kind: ElementKind, axis: Axis, controller: &Arc<dyn Controller>) -> Arc<PoolElement> {
    Arc::new(PoolElement::new(name, kind, axis, controller.clone()))
}

/// Calls recorded for one verb, in order.
pub fn calls_of(log: &CallLog, verb: &str) -> Vec<String> {
    log.lock()
        .iter()
        .filter(|c| c.contains(&format!(":{}", verb)))
        .cloned()
        .collect()
}
