//! Commonly used types.
//!
//! ```
//! use daq_sync::prelude::*;
//! ```

pub use crate::config::{ConfigError, SyncConfig};
pub use crate::logging::{LogConfig, OutputFormat};

pub use daq_core::controller::{Axis, Controller, DriverResult, ListenerCapable, Synchronizable};
pub use daq_core::element::{ElementKind, PoolElement};
pub use daq_core::error::{AppResult, DaqError, DriverError, DriverErrorKind};
pub use daq_core::event::{EventKind, EventType, EventValue, Listener, Propagation};
pub use daq_core::state::{ElementStatus, LimitSwitches, State, StateReport};
pub use daq_core::synchronization::{Domain, SynchronizationDescription, SynchronizationGroup};

pub use daq_action::{
    AcquisitionAction, ActionSettings, ActionState, ControllerAction, ControllerRegistry,
    MotionAction, TGGenerationAction,
};
pub use daq_generator::{FunctionGenerator, GeneratorSettings, SoftwareTriggerGateController};
pub use daq_driver_mock::{ErrorConfig, MockCounterController, MockMotorController};
