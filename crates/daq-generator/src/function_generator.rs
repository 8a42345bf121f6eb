//! Software function generator.
//!
//! Emits Active/Passive events on a wall-clock timebase from a dedicated
//! thread:
//!
//! ```text
//! offset ─▶ Active(0) ─ active period ─▶ Passive(0) ─ passive period ─▶ Active(1) …
//! ```
//!
//! Periods longer than `max_nap` are slept as equal sub-intervals
//! ([`NapSchedule`]) and the cancel token is checked after each one, so
//! [`FunctionGenerator::stop`] is observed within one sub-interval.
//!
//! # Lifecycle
//!
//! `Idle → Prepared → Generating → Idle`. `prepare()` only allocates the thread
//! builder. `start()` spawns it unless a run is already alive. The thread
//! clears the alive flag on every exit path, including a panicking listener.

use crate::config::GeneratorSettings;
use daq_core::cancel::CancelToken;
use daq_core::error::{AppResult, DaqError, DriverError, DriverErrorKind};
use daq_core::event::{same_listener, EventKind, EventType, EventValue, Listener, Propagation};
use daq_core::synchronization::TimeSchedule;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

// =============================================================================
// Nap schedule
// =============================================================================

/// A period split into `count` equal sleeps of `nap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NapSchedule {
    /// Number of sleeps.
    pub count: u32,
    /// Length of each sleep.
    pub nap: Duration,
}

impl NapSchedule {
    /// Splits `period` into the fewest equal naps no longer than `max_nap`.
    ///
    /// A zero period gives an empty schedule.
    pub fn split(period: Duration, max_nap: Duration) -> Self {
        if period.is_zero() {
            return Self::default();
        }
        let max_nap = max_nap.max(Duration::from_nanos(1));
        let count = period.as_nanos().div_ceil(max_nap.as_nanos()).max(1);
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        Self {
            count,
            nap: period / count,
        }
    }

    /// Time actually slept, `nap * count`.
    pub fn total(&self) -> Duration {
        self.nap * self.count
    }
}

/// Lifecycle phase of a [`FunctionGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorPhase {
    /// No thread allocated.
    Idle,
    /// Thread allocated, not running.
    Prepared,
    /// Thread emitting events.
    Generating,
}

impl std::fmt::Display for GeneratorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorPhase::Idle => write!(f, "Idle"),
            GeneratorPhase::Prepared => write!(f, "Prepared"),
            GeneratorPhase::Generating => write!(f, "Generating"),
        }
    }
}

// =============================================================================
// Generator
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Plan {
    offset: Duration,
    repetitions: u64,
    active: NapSchedule,
    passive: NapSchedule,
}

/// State guarded by the start/stop lock.
struct Control {
    schedule: TimeSchedule,
    active_naps: NapSchedule,
    passive_naps: NapSchedule,
    builder: Option<thread::Builder>,
    handle: Option<JoinHandle<()>>,
    listeners: Vec<Arc<dyn Listener>>,
}

/// State shared with the generation thread.
struct Shared {
    name: String,
    cancel: CancelToken,
    alive: Mutex<bool>,
    idle: Condvar,
    thread_id: Mutex<Option<ThreadId>>,
    active_fired: AtomicU64,
}

/// Resets the alive flag and wakes waiters when the generation thread exits.
struct AliveGuard<'a>(&'a Shared);

impl Drop for AliveGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(generator = %self.0.name, "Generation thread panicked");
        }
        *self.0.alive.lock() = false;
        self.0.idle.notify_all();
    }
}

/// Software time-domain trigger/gate generator.
///
/// Emits Active/Passive events from a dedicated thread following a
/// [`TimeSchedule`]. `stop` may be called from a listener running on that thread.
pub struct FunctionGenerator {
    settings: GeneratorSettings,
    control: Mutex<Control>,
    shared: Arc<Shared>,
}

impl FunctionGenerator {
    /// Creates an idle generator with an empty schedule.
    pub fn new(name: impl Into<String>, settings: GeneratorSettings) -> Self {
        Self {
            settings,
            control: Mutex::new(Control {
                schedule: TimeSchedule {
                    offset: Duration::ZERO,
                    active_period: Duration::ZERO,
                    passive_period: Duration::ZERO,
                    repetitions: 0,
                },
                active_naps: NapSchedule::default(),
                passive_naps: NapSchedule::default(),
                builder: None,
                handle: None,
                listeners: Vec::new(),
            }),
            shared: Arc::new(Shared {
                name: name.into(),
                cancel: CancelToken::new(),
                alive: Mutex::new(false),
                idle: Condvar::new(),
                thread_id: Mutex::new(None),
                active_fired: AtomicU64::new(0),
            }),
        }
    }

    /// Generator name, used as the event source.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Delay before the first Active event.
    pub fn set_offset(&self, offset: Duration) {
        self.control.lock().schedule.offset = offset;
    }

    /// Number of Active/Passive pairs.
    pub fn set_repetitions(&self, repetitions: u64) {
        self.control.lock().schedule.repetitions = repetitions;
    }

    /// Sets the active period and recomputes its naps.
    pub fn set_active_period(&self, period: Duration) {
        let mut control = self.control.lock();
        control.schedule.active_period = period;
        control.active_naps = NapSchedule::split(period, self.settings.max_nap);
    }

    /// Sets the passive period and recomputes its naps.
    pub fn set_passive_period(&self, period: Duration) {
        let mut control = self.control.lock();
        control.schedule.passive_period = period;
        control.passive_naps = NapSchedule::split(period, self.settings.max_nap);
    }

    /// Applies a complete time schedule.
    pub fn configure(&self, schedule: TimeSchedule) {
        let mut control = self.control.lock();
        control.active_naps = NapSchedule::split(schedule.active_period, self.settings.max_nap);
        control.passive_naps = NapSchedule::split(schedule.passive_period, self.settings.max_nap);
        control.schedule = schedule;
    }

    /// Current time schedule.
    pub fn schedule(&self) -> TimeSchedule {
        self.control.lock().schedule
    }

    /// Nap split of the active period.
    pub fn active_naps(&self) -> NapSchedule {
        self.control.lock().active_naps
    }

    /// Nap split of the passive period.
    pub fn passive_naps(&self) -> NapSchedule {
        self.control.lock().passive_naps
    }

    // -------------------------------------------------------------------------
    // Listeners
    // -------------------------------------------------------------------------

    /// Registers a listener for the next start. Duplicates are ignored.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) {
        let mut control = self.control.lock();
        if !control.listeners.iter().any(|l| same_listener(l, &listener)) {
            control.listeners.push(listener);
        }
    }

    /// Unregisters a listener. Takes effect on the next start.
    pub fn remove_listener(&self, listener: &Arc<dyn Listener>) {
        self.control
            .lock()
            .listeners
            .retain(|l| !same_listener(l, listener));
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.control.lock().listeners.len()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Allocates the generation thread without starting it.
    pub fn prepare(&self) -> AppResult<()> {
        let mut control = self.control.lock();
        if *self.shared.alive.lock() {
            return Err(DaqError::InvalidState(format!(
                "generator '{}' is already generating",
                self.shared.name
            )));
        }
        if control.builder.is_none() {
            control.builder =
                Some(thread::Builder::new().name(format!("fgen-{}", self.shared.name)));
        }
        Ok(())
    }

    /// Starts generating. A call while a run is alive is a no-op.
    pub fn start(&self) -> AppResult<()> {
        let mut control = self.control.lock();
        {
            let mut alive = self.shared.alive.lock();
            if *alive {
                debug!(generator = %self.shared.name, "Generator already running");
                return Ok(());
            }
            *alive = true;
        }

        // The previous run has cleared its alive flag, joining is immediate.
        if let Some(previous) = control.handle.take() {
            if previous.join().is_err() {
                warn!(generator = %self.shared.name, "Previous generation thread had panicked");
            }
        }

        self.shared.cancel.reset();
        self.shared.active_fired.store(0, Ordering::SeqCst);

        let plan = Plan {
            offset: control.schedule.offset,
            repetitions: control.schedule.repetitions,
            active: control.active_naps,
            passive: control.passive_naps,
        };
        let listeners = control.listeners.clone();
        let shared = self.shared.clone();
        let builder = control
            .builder
            .take()
            .unwrap_or_else(|| thread::Builder::new().name(format!("fgen-{}", self.shared.name)));

        match builder.spawn(move || generate(shared, plan, listeners)) {
            Ok(handle) => {
                *self.shared.thread_id.lock() = Some(handle.thread().id());
                control.handle = Some(handle);
                info!(
                    generator = %self.shared.name,
                    repetitions = plan.repetitions,
                    active_naps = plan.active.count,
                    passive_naps = plan.passive.count,
                    "Generation started"
                );
                Ok(())
            }
            Err(e) => {
                *self.shared.alive.lock() = false;
                self.shared.idle.notify_all();
                Err(DriverError::new(
                    self.shared.name.clone(),
                    DriverErrorKind::Initialization,
                    format!("failed to spawn generation thread: {}", e),
                )
                .into())
            }
        }
    }

    /// Stops generating and waits for the thread to exit.
    ///
    /// Safe to call from any thread, after natural completion and from a
    /// listener running on the generation thread itself (which skips the join).
    pub fn stop(&self) {
        let handle = {
            let mut control = self.control.lock();
            self.shared.cancel.cancel();
            control.builder = None;
            control.handle.take()
        };

        let Some(handle) = handle else {
            return;
        };

        if Some(thread::current().id()) == *self.shared.thread_id.lock() {
            debug!(generator = %self.shared.name, "Stop requested from generation thread");
            return;
        }
        if let Err(e) = handle.join() {
            error!(generator = %self.shared.name, "Generation thread panicked: {:?}", e);
        }
        info!(
            generator = %self.shared.name,
            active_events = self.active_events_fired(),
            "Generation stopped"
        );
    }

    /// `true` while the generation thread runs.
    pub fn is_generating(&self) -> bool {
        *self.shared.alive.lock()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> GeneratorPhase {
        let control = self.control.lock();
        if *self.shared.alive.lock() {
            GeneratorPhase::Generating
        } else if control.builder.is_some() {
            GeneratorPhase::Prepared
        } else {
            GeneratorPhase::Idle
        }
    }

    /// Blocks until the generator is idle or `timeout` elapses.
    ///
    /// Returns `true` if the generator is idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut alive = self.shared.alive.lock();
        while *alive {
            if self.shared.idle.wait_until(&mut alive, deadline).timed_out() {
                break;
            }
        }
        !*alive
    }

    /// Active events emitted by the current or last run.
    pub fn active_events_fired(&self) -> u64 {
        self.shared.active_fired.load(Ordering::SeqCst)
    }
}

impl Drop for FunctionGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FunctionGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionGenerator")
            .field("name", &self.shared.name)
            .field("phase", &self.phase())
            .field("schedule", &self.schedule())
            .finish()
    }
}

// =============================================================================
// Generation thread
// =============================================================================

fn fire(shared: &Shared, listeners: &[Arc<dyn Listener>], kind: EventKind, index: u64) {
    let event_type = EventType::new(kind, Propagation::PropagateSynchronously);
    let value = EventValue::Index(index);
    for listener in listeners {
        listener.event_received(&shared.name, event_type, &value);
    }
}

/// Sleeps through a nap schedule. Returns `true` if cancelled.
fn nap(shared: &Shared, schedule: NapSchedule) -> bool {
    let mut deadline = Instant::now();
    for _ in 0..schedule.count {
        deadline += schedule.nap;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if shared.cancel.wait_timeout(remaining) {
            return true;
        }
    }
    shared.cancel.is_cancelled()
}

fn generate(shared: Arc<Shared>, plan: Plan, listeners: Vec<Arc<dyn Listener>>) {
    let _guard = AliveGuard(&shared);

    if shared.cancel.wait_timeout(plan.offset) {
        debug!(generator = %shared.name, "Stopped during offset");
        return;
    }

    for index in 0..plan.repetitions {
        fire(&shared, &listeners, EventKind::Active, index);
        shared.active_fired.fetch_add(1, Ordering::SeqCst);
        if nap(&shared, plan.active) {
            debug!(generator = %shared.name, index, "Stopped during active period");
            return;
        }
        fire(&shared, &listeners, EventKind::Passive, index);
        if nap(&shared, plan.passive) {
            debug!(generator = %shared.name, index, "Stopped during passive period");
            return;
        }
    }
    debug!(generator = %shared.name, repetitions = plan.repetitions, "Generation complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn settings(max_nap_ms: u64) -> GeneratorSettings {
        GeneratorSettings {
            max_nap: Duration::from_millis(max_nap_ms),
        }
    }

    fn recorder() -> (Arc<PlMutex<Vec<(EventKind, u64)>>>, Arc<dyn Listener>) {
        let events = Arc::new(PlMutex::new(Vec::new()));
        let sink = events.clone();
        let listener: Arc<dyn Listener> =
            Arc::new(move |_: &str, t: EventType, v: &EventValue| {
                if let EventValue::Index(i) = v {
                    sink.lock().push((t.kind, *i));
                }
            });
        (events, listener)
    }

    #[test]
    fn test_nap_schedule_splits_long_periods() {
        let naps = NapSchedule::split(Duration::from_millis(350), Duration::from_millis(100));
        assert_eq!(naps.count, 4);
        assert!(naps.nap <= Duration::from_millis(100));
        assert_eq!(naps.total(), Duration::from_millis(350));

        let short = NapSchedule::split(Duration::from_millis(30), Duration::from_millis(100));
        assert_eq!(short.count, 1);

        assert_eq!(
            NapSchedule::split(Duration::ZERO, Duration::from_millis(100)).count,
            0
        );
    }

    #[test]
    fn test_generates_all_repetitions() {
        let generator = FunctionGenerator::new("tg0", settings(5));
        let (events, listener) = recorder();
        generator.add_listener(listener);
        generator.configure(TimeSchedule {
            offset: Duration::ZERO,
            active_period: Duration::from_millis(5),
            passive_period: Duration::from_millis(5),
            repetitions: 5,
        });

        generator.prepare().unwrap();
        assert_eq!(generator.phase(), GeneratorPhase::Prepared);
        generator.start().unwrap();
        assert!(generator.wait_idle(Duration::from_secs(5)));

        let events = events.lock();
        assert_eq!(events.len(), 10);
        for (i, pair) in events.chunks(2).enumerate() {
            assert_eq!(pair, [(EventKind::Active, i as u64), (EventKind::Passive, i as u64)]);
        }
        assert_eq!(generator.active_events_fired(), 5);
        assert_eq!(generator.phase(), GeneratorPhase::Idle);
    }

    #[test]
    fn test_stop_interrupts_long_active_period() {
        let generator = FunctionGenerator::new("tg0", settings(100));
        generator.configure(TimeSchedule {
            offset: Duration::ZERO,
            active_period: Duration::from_secs(10),
            passive_period: Duration::from_secs(10),
            repetitions: 3,
        });
        generator.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(generator.is_generating());

        let start = Instant::now();
        generator.stop();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!generator.is_generating());
        assert_eq!(generator.active_events_fired(), 1);
    }

    #[test]
    fn test_second_start_is_noop() {
        let generator = FunctionGenerator::new("tg0", settings(10));
        let (events, listener) = recorder();
        generator.add_listener(listener);
        generator.configure(TimeSchedule {
            offset: Duration::from_millis(20),
            active_period: Duration::from_millis(10),
            passive_period: Duration::from_millis(10),
            repetitions: 2,
        });
        generator.start().unwrap();
        generator.start().unwrap();
        assert!(generator.wait_idle(Duration::from_secs(5)));
        assert_eq!(events.lock().len(), 4);
    }

    #[test]
    fn test_stop_after_natural_completion() {
        let generator = FunctionGenerator::new("tg0", settings(10));
        generator.configure(TimeSchedule {
            offset: Duration::ZERO,
            active_period: Duration::from_millis(1),
            passive_period: Duration::from_millis(1),
            repetitions: 1,
        });
        generator.start().unwrap();
        assert!(generator.wait_idle(Duration::from_secs(5)));
        generator.stop();
        generator.stop();
        assert_eq!(generator.phase(), GeneratorPhase::Idle);
    }

    #[test]
    fn test_panicking_listener_clears_alive() {
        let generator = FunctionGenerator::new("tg0", settings(10));
        let listener: Arc<dyn Listener> =
            Arc::new(|_: &str, _: EventType, _: &EventValue| panic!("listener failure"));
        generator.add_listener(listener);
        generator.configure(TimeSchedule {
            offset: Duration::ZERO,
            active_period: Duration::from_millis(10),
            passive_period: Duration::from_millis(10),
            repetitions: 3,
        });
        generator.start().unwrap();
        assert!(generator.wait_idle(Duration::from_secs(5)));
        assert!(!generator.is_generating());
        generator.stop();
    }

    #[test]
    fn test_restart_after_stop() {
        let generator = FunctionGenerator::new("tg0", settings(10));
        let (events, listener) = recorder();
        generator.add_listener(listener);
        generator.configure(TimeSchedule {
            offset: Duration::ZERO,
            active_period: Duration::from_millis(2),
            passive_period: Duration::from_millis(2),
            repetitions: 2,
        });
        generator.start().unwrap();
        assert!(generator.wait_idle(Duration::from_secs(5)));
        generator.start().unwrap();
        assert!(generator.wait_idle(Duration::from_secs(5)));
        assert_eq!(events.lock().len(), 8);
    }
}
