//! Common infrastructure for mock controllers.
//!
//! - **errors**: Error injection framework for controller callbacks
//! - **rng**: Seeded random number generator

pub mod errors;
pub mod rng;

// Re-export commonly used types
pub use errors::{ErrorConfig, ErrorScenario};
pub use rng::MockRng;
