//! `daq-core`
//!
//! Core types for synchronized trigger/gate generation and acquisition.
//!
//! ## Key Types
//!
//! - [`Controller`]: the `Pre*All → Pre*One → *One → *All` callback protocol
//! - [`PoolElement`]: one axis of a controller with cached status and listeners
//! - [`SynchronizationDescription`]: declarative repeated intervals, turned into a
//!   [`GeneratorConfiguration`] by [`interpret`]
//! - [`CancelToken`]: condition-variable based cooperative cancellation
//! - [`DaqError`]: error taxonomy shared by all crates
//!
//! ## Example
//!
//! ```rust
//! use daq_core::synchronization::{interpret, SynchronizationDescription, SynchronizationGroup};
//!
//! let description = SynchronizationDescription::new(vec![
//!     SynchronizationGroup::position(0.0, 0.1, 1.0, 5),
//! ]);
//! let config = interpret(&description, None).unwrap();
//! assert_eq!(config.active_events(), 5);
//! ```

pub mod cancel;
pub mod controller;
pub mod element;
pub mod error;
pub mod event;
pub mod limits;
pub mod state;
pub mod synchronization;

pub use cancel::CancelToken;
pub use controller::{Axis, Controller, DriverResult, ListenerCapable, Synchronizable};
pub use element::{ElementKind, PoolElement};
pub use error::{AppResult, CallbackError, DaqError, DriverError, DriverErrorKind, StartFailure};
pub use event::{EventKind, EventType, EventValue, Listener, ListenerSet, Propagation};
pub use state::{ElementStatus, LimitSwitches, State, StateReport};
pub use synchronization::{
    interpret, Domain, GeneratorConfiguration, SynchronizationDescription, SynchronizationGroup,
};
