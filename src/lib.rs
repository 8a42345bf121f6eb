//! # daq_sync
//!
//! Synchronized trigger/gate generation and acquisition.
//!
//! Motors, counters and trigger/gate generators are started, synchronized and
//! stopped in lock-step during a scan. This crate ties the workspace together:
//!
//! - **`config`**: figment-based loading of [`config::SyncConfig`] from TOML and
//!   `DAQ_SYNC_` environment variables
//! - **`logging`**: `tracing-subscriber` setup (pretty, compact or JSON output)
//! - **`prelude`**: the types needed to build and run actions
//!
//! The building blocks live in the member crates and are re-exported here:
//!
//! - [`daq_core`]: controller protocol, elements, events, synchronization descriptions
//! - [`daq_generator`]: software trigger/gate generation
//! - [`daq_action`]: generation, motion and acquisition actions
//! - [`daq_driver_mock`]: simulated motor and counter controllers
//!
//! ## Example
//!
//! ```no_run
//! use daq_sync::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = SyncConfig::load()?;
//! let registry = Arc::new(ControllerRegistry::new());
//!
//! let tg = Arc::new(SoftwareTriggerGateController::with_axes("tgctrl", config.generator, [1]));
//! let channel = Arc::new(PoolElement::new("tg01", ElementKind::TriggerGate, 1, tg));
//!
//! let action = TGGenerationAction::new("tggen", registry, config.action);
//! action.add_element(channel);
//!
//! let description = SynchronizationDescription::new(vec![
//!     SynchronizationGroup::time(0.0, 0.1, 0.2, 10),
//! ]);
//! action.start_action(&description, None, None)?;
//! action.action_loop()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod prelude;

pub use daq_action;
pub use daq_core;
pub use daq_driver_mock;
pub use daq_generator;
