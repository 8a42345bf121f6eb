//! `daq-action`
//!
//! Coordinated actions over controllers.
//!
//! - [`ControllerAction`]: the generic start / poll / stop / abort protocol
//! - [`TGGenerationAction`]: trigger/gate channels with listener and position-feed wiring
//! - [`MotionAction`]: motors moved together, positions propagated while moving
//! - [`AcquisitionAction`]: timed counting, directly or per trigger
//! - [`ControllerRegistry`] / [`ActionContext`]: one action per controller at a time

pub mod acquisition;
pub mod action;
pub mod config;
pub mod context;
pub mod generation;
pub mod motion;

pub use acquisition::{AcquisitionAction, TriggerStats};
pub use action::{ActionState, ControllerAction, ControllerGroup, StateMap};
pub use config::ActionSettings;
pub use context::{ActionContext, ControllerRegistry};
pub use generation::TGGenerationAction;
pub use motion::MotionAction;
