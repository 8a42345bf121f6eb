//! Mock Controllers for synchronized acquisition
//!
//! Simulated controllers implementing the callback protocol, for testing
//! actions without physical hardware. Simulation is computed from elapsed
//! wall-clock time on every query; no background threads are used.
//!
//! # Available Mock Controllers
//!
//! - [`MockMotorController`] - constant-velocity motion with travel limits
//! - [`MockCounterController`] - constant-rate counting over an integration time
//!
//! Both accept an [`ErrorConfig`] to inject callback failures per verb and axis.

pub mod common;
mod counter;
mod motor;

// Re-export common types
pub use common::{ErrorConfig, ErrorScenario, MockRng};

// Re-export controller types
pub use counter::{MockCounterConfig, MockCounterController};
pub use motor::{MockMotorConfig, MockMotorController};
