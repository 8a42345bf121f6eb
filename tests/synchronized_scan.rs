//! End-to-end scans: trigger/gate generation driving acquisitions, in the
//! time domain and in the position domain of a moving motor.

use daq_sync::prelude::*;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_test::traced_test;

// =============================================================================
// Test Configuration
// =============================================================================

fn action_settings() -> ActionSettings {
    ActionSettings {
        nap: Duration::from_millis(10),
        abort_retries: 10,
    }
}

struct Bench {
    registry: Arc<ControllerRegistry>,
    tg: Arc<SoftwareTriggerGateController>,
    channel: Arc<PoolElement>,
}

impl Bench {
    fn new() -> Self {
        let tg = Arc::new(SoftwareTriggerGateController::with_axes(
            "tgctrl",
            GeneratorSettings::default(),
            [1],
        ));
        let channel = Arc::new(PoolElement::new(
            "tg01",
            ElementKind::TriggerGate,
            1,
            tg.clone(),
        ));
        Self {
            registry: Arc::new(ControllerRegistry::new()),
            tg,
            channel,
        }
    }

    fn generation(&self) -> TGGenerationAction {
        let action = TGGenerationAction::new("tggen", self.registry.clone(), action_settings());
        action.add_element(self.channel.clone());
        action
    }
}

fn active_counter() -> (Arc<Mutex<Vec<u64>>>, Arc<dyn Listener>) {
    let ids = Arc::new(Mutex::new(Vec::new()));
    let sink = ids.clone();
    let listener: Arc<dyn Listener> = Arc::new(move |_: &str, t: EventType, v: &EventValue| {
        if t.kind == EventKind::Active {
            if let EventValue::Index(i) = v {
                sink.lock().push(*i);
            }
        }
    });
    (ids, listener)
}

// =============================================================================
// Time domain
// =============================================================================

#[test]
fn test_ten_repetitions_end_on() {
    let bench = Bench::new();
    let action = bench.generation();
    let description =
        SynchronizationDescription::new(vec![SynchronizationGroup::time(0.0, 0.1, 0.2, 10)]);
    let (ids, listener) = active_counter();

    let started = Instant::now();
    action.start_action(&description, Some(listener), None).unwrap();
    action.action_loop().unwrap();

    assert_eq!(*ids.lock(), (0..10).collect::<Vec<u64>>());
    assert_eq!(bench.channel.state(), State::On);
    assert!(started.elapsed() >= Duration::from_millis(1800));
    assert_eq!(bench.registry.busy_count(), 0);
}

#[test]
fn test_abort_after_100ms_ends_on_not_fault() {
    let bench = Bench::new();
    let action = bench.generation();
    let description =
        SynchronizationDescription::new(vec![SynchronizationGroup::time(0.0, 0.1, 0.2, 10)]);
    let (ids, listener) = active_counter();

    action.start_action(&description, Some(listener), None).unwrap();
    thread::scope(|s| {
        let looping = s.spawn(|| action.action_loop());
        thread::sleep(Duration::from_millis(100));
        action.abort_action().unwrap();
        looping.join().unwrap().unwrap();
    });

    assert!(ids.lock().len() < 10);
    assert_eq!(bench.channel.state(), State::On);
    assert_eq!(action.state(), ActionState::Idle);
}

#[test]
fn test_configuration_echo_survives_json() {
    let bench = Bench::new();
    let json = r#"[{"Delay":{"Time":0.5},"Initial":{"Position":0.0},"Active":{"Time":0.01,"Position":0.1},"Total":{"Time":0.02,"Position":1.0},"Repeats":4}]"#;
    let description = SynchronizationDescription::from_json(json).unwrap();

    bench.tg.set_configuration(1, &description).unwrap();
    let echoed = bench.tg.get_configuration(1).unwrap();
    assert_eq!(echoed, description);
    assert_eq!(
        SynchronizationDescription::from_json(&echoed.to_json().unwrap()).unwrap(),
        description
    );
}

#[test]
#[traced_test]
fn test_actions_log_inside_action_span() {
    let bench = Bench::new();
    let action = bench.generation();
    let description =
        SynchronizationDescription::new(vec![SynchronizationGroup::time(0.0, 0.005, 0.01, 2)]);
    action.start_action(&description, None, None).unwrap();
    action.action_loop().unwrap();

    assert!(logs_contain("action{action=tggen"));
    assert!(logs_contain("Action started"));
    assert!(logs_contain("Action finished"));
}

// =============================================================================
// Position domain
// =============================================================================

#[test]
fn test_step_scan_counts_at_each_position_trigger() {
    let bench = Bench::new();
    let motor = Arc::new(MockMotorController::new("motctrl", [1]));
    let mot01 = Arc::new(PoolElement::new("mot01", ElementKind::Motor, 1, motor));
    let counter = Arc::new(MockCounterController::new("ctctrl", [1]));
    let ct01 = Arc::new(PoolElement::new("ct01", ElementKind::Counter, 1, counter));

    let motion = MotionAction::new("mv", bench.registry.clone(), action_settings());
    motion.add_element(mot01.clone());
    let acquisition = Arc::new(AcquisitionAction::new(
        "acq",
        bench.registry.clone(),
        action_settings(),
    ));
    acquisition.add_element(ct01.clone());
    let generation = bench.generation();

    // Triggers at 0.5, 1.5 and 2.5 while the motor travels 0 -> 3 at 10 units/s.
    let description =
        SynchronizationDescription::new(vec![SynchronizationGroup::position(0.5, 0.2, 1.0, 3)]);
    let trigger = acquisition.trigger_listener(Duration::from_millis(20));
    generation
        .start_action(&description, Some(trigger), Some(mot01.clone()))
        .unwrap();

    let positions = motion
        .move_to(&BTreeMap::from([("mot01".to_string(), 3.0)]))
        .unwrap();
    generation.action_loop().unwrap();
    acquisition.join_pending();

    assert_eq!(positions.get("mot01"), Some(&3.0));
    let stats = acquisition.trigger_stats();
    assert_eq!(stats.triggered, 3, "{:?}", stats);
    assert_eq!(stats.completed, 3);
    assert_eq!(acquisition.last_values().get("ct01"), Some(&20.0));
    assert_eq!(bench.channel.state(), State::On);
    assert_eq!(mot01.state(), State::On);
    assert_eq!(bench.registry.busy_count(), 0);
}

#[test]
fn test_busy_generator_rejects_second_scan() {
    let bench = Bench::new();
    let first = bench.generation();
    let second = bench.generation();
    let description =
        SynchronizationDescription::new(vec![SynchronizationGroup::time(0.0, 0.05, 0.1, 20)]);

    first.start_action(&description, None, None).unwrap();
    assert!(matches!(
        second.start_action(&description, None, None),
        Err(DaqError::ControllerBusy { .. })
    ));
    first.abort_and_wait().unwrap();
    assert_eq!(bench.channel.state(), State::On);
}
