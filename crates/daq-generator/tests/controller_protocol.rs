//! SoftwareTriggerGateController driven through the controller protocol only.

use daq_core::controller::{Controller, ListenerCapable, Synchronizable};
use daq_core::event::{EventKind, EventType, EventValue, Listener};
use daq_core::state::State;
use daq_core::synchronization::{SynchronizationDescription, SynchronizationGroup};
use daq_generator::{GeneratorSettings, SoftwareTriggerGateController};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

fn controller() -> Arc<SoftwareTriggerGateController> {
    Arc::new(SoftwareTriggerGateController::with_axes(
        "tgctrl",
        GeneratorSettings {
            max_nap: Duration::from_millis(10),
        },
        [1, 2],
    ))
}

fn start(ctrl: &SoftwareTriggerGateController, axes: &[u32]) {
    ctrl.pre_start_all().unwrap();
    for &axis in axes {
        assert!(ctrl.pre_start_one(axis, None).unwrap());
        ctrl.start_one(axis, None).unwrap();
    }
    ctrl.start_all().unwrap();
}

fn wait_until_on(ctrl: &SoftwareTriggerGateController, axis: u32) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while ctrl.state_one(axis).unwrap().state() == State::Moving {
        assert!(Instant::now() < deadline, "axis {} never finished", axis);
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_axes_generate_independently() {
    let ctrl = controller();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener: Arc<dyn Listener> = Arc::new(move |source: &str, t: EventType, _: &EventValue| {
        if t.kind == EventKind::Active {
            sink.lock().push(source.to_string());
        }
    });

    ctrl.set_configuration(
        1,
        &SynchronizationDescription::new(vec![SynchronizationGroup::time(0.0, 0.005, 0.01, 3)]),
    )
    .unwrap();
    ctrl.set_configuration(
        2,
        &SynchronizationDescription::new(vec![SynchronizationGroup::time(0.0, 0.005, 0.01, 5)]),
    )
    .unwrap();
    ctrl.add_listener(1, listener.clone()).unwrap();
    ctrl.add_listener(2, listener.clone()).unwrap();

    start(&ctrl, &[1, 2]);
    wait_until_on(&ctrl, 1);
    wait_until_on(&ctrl, 2);

    let seen = seen.lock();
    assert_eq!(seen.iter().filter(|s| s.as_str() == "tgctrl.1").count(), 3);
    assert_eq!(seen.iter().filter(|s| s.as_str() == "tgctrl.2").count(), 5);
    assert_eq!(ctrl.active_events_fired(2).unwrap(), 5);
}

/// Stops its own axis when the given Active event arrives.
struct StopAt {
    ctrl: Weak<SoftwareTriggerGateController>,
    index: u64,
}

impl Listener for StopAt {
    fn event_received(&self, _source: &str, event_type: EventType, value: &EventValue) {
        if event_type.kind == EventKind::Active && value == &EventValue::Index(self.index) {
            if let Some(ctrl) = self.ctrl.upgrade() {
                ctrl.stop_one(1).unwrap();
            }
        }
    }
}

#[test]
fn test_listener_may_stop_generation_from_generator_thread() {
    let ctrl = controller();
    ctrl.set_configuration(
        1,
        &SynchronizationDescription::new(vec![SynchronizationGroup::time(0.0, 0.005, 0.01, 100)]),
    )
    .unwrap();
    let stopper: Arc<dyn Listener> = Arc::new(StopAt {
        ctrl: Arc::downgrade(&ctrl),
        index: 2,
    });
    ctrl.add_listener(1, stopper).unwrap();

    start(&ctrl, &[1]);
    wait_until_on(&ctrl, 1);
    assert_eq!(ctrl.active_events_fired(1).unwrap(), 3);

    // The axis can be started again after stopping itself.
    start(&ctrl, &[1]);
    ctrl.abort_one(1).unwrap();
    assert_eq!(ctrl.state_one(1).unwrap().state(), State::On);
}

#[test]
fn test_removed_listener_receives_nothing_on_next_start() {
    let ctrl = controller();
    let count = Arc::new(Mutex::new(0u32));
    let sink = count.clone();
    let listener: Arc<dyn Listener> = Arc::new(move |_: &str, _: EventType, _: &EventValue| {
        *sink.lock() += 1;
    });
    ctrl.set_configuration(
        1,
        &SynchronizationDescription::new(vec![SynchronizationGroup::time(0.0, 0.002, 0.004, 2)]),
    )
    .unwrap();

    ctrl.add_listener(1, listener.clone()).unwrap();
    start(&ctrl, &[1]);
    wait_until_on(&ctrl, 1);
    let first_run = *count.lock();
    assert_eq!(first_run, 4);

    ctrl.remove_listener(1, &listener).unwrap();
    start(&ctrl, &[1]);
    wait_until_on(&ctrl, 1);
    assert_eq!(*count.lock(), first_run);
}
