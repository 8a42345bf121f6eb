//! `daq-generator`
//!
//! Software trigger/gate generation.
//!
//! - [`FunctionGenerator`]: wall-clock Active/Passive pulses from a dedicated thread
//! - [`PositionGenerator`]: Active/Passive pulses from position thresholds
//! - [`SoftwareTriggerGateController`]: both generators behind the controller protocol

pub mod config;
pub mod function_generator;
pub mod position;
pub mod software_tg;

pub use config::GeneratorSettings;
pub use function_generator::{FunctionGenerator, GeneratorPhase, NapSchedule};
pub use position::PositionGenerator;
pub use software_tg::SoftwareTriggerGateController;
