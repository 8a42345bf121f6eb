//! Custom error types for synchronized acquisition.
//!
//! This module defines the primary error type, `DaqError`, shared by the
//! generator, action and driver crates. Using the `thiserror` crate, it provides
//! a centralized and consistent way to report failures, from an invalid
//! synchronization description to a controller callback that blew up halfway
//! through a start sequence.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: the synchronization description or settings are
//!   semantically invalid. Always raised before any hardware call.
//! - **`ActionStart`**: a controller refused to start one of its axes
//!   (`PreStartOne` answered `false`) and nothing else was started.
//! - **`PartialStart`**: some axes started and some did not, on the same
//!   controller or across controllers. Starting is not transactional, so the
//!   caller decides whether to abort the controllers that did start.
//! - **`ControllerCallback`**: a controller callback returned an error or
//!   panicked. Carries controller, verb and axis context.
//! - **`ControllerBusy`**: the controller is already owned by another action.
//! - **`AbortTimeout`**: elements were still moving after the bounded number
//!   of post-abort state polls.
//!
//! Driver code returns [`DriverError`]; the action layer wraps it into a
//! [`CallbackError`] once it knows which verb and axis were involved.

use crate::controller::Axis;
use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Broad category of a [`DriverError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Device did not initialize.
    Initialization,
    /// Rejected configuration.
    Configuration,
    /// Link to the device failed.
    Communication,
    /// Device reported a fault.
    Hardware,
    /// Device did not answer in time.
    Timeout,
    /// Unknown axis or out-of-range value.
    InvalidParameter,
    /// Verb not supported by this controller.
    Unsupported,
    /// Anything else, including callback panics.
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Unsupported => "unsupported",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Error returned by a controller callback.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Controller or driver name.
    pub driver_type: String,
    /// Category.
    pub kind: DriverErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl DriverError {
    /// Creates a driver error.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }

    /// Error for an axis the controller does not know about.
    pub fn unknown_axis(driver_type: impl Into<String>, axis: Axis) -> Self {
        Self::new(
            driver_type,
            DriverErrorKind::InvalidParameter,
            format!("axis {} is not defined", axis),
        )
    }
}

// =============================================================================
// Callback Errors
// =============================================================================

/// A controller callback failure with the action context attached.
#[derive(Error, Debug, Clone, PartialEq)]
pub struct CallbackError {
    /// Controller name.
    pub controller: String,
    /// Protocol verb, e.g. `PreStartOne` or `StateAll`.
    pub verb: &'static str,
    /// Axis for the per-axis verbs.
    pub axis: Option<Axis>,
    /// What went wrong. Panics are reported with `DriverErrorKind::Unknown`.
    #[source]
    pub source: DriverError,
}

impl std::fmt::Display for CallbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.axis {
            Some(axis) => write!(
                f,
                "{} failed on controller '{}' axis {}: {}",
                self.verb, self.controller, axis, self.source.message
            ),
            None => write!(
                f,
                "{} failed on controller '{}': {}",
                self.verb, self.controller, self.source.message
            ),
        }
    }
}

/// One controller that did not start during a multi-controller start.
#[derive(Debug, Clone, PartialEq)]
pub struct StartFailure {
    /// Controller that failed to start.
    pub controller: String,
    /// Axis involved, `None` for the controller-wide verbs.
    pub axis: Option<Axis>,
    /// Refusal or error message.
    pub reason: String,
}

impl std::fmt::Display for StartFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.axis {
            Some(axis) => write!(f, "{}[{}]: {}", self.controller, axis, self.reason),
            None => write!(f, "{}: {}", self.controller, self.reason),
        }
    }
}

fn join_failures(failures: &[StartFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for synchronized acquisition.
///
/// # Error Categories
///
/// 1. **Configuration Errors** - `Configuration`
///    - Raised while interpreting a synchronization description or validating
///      settings, before any controller is touched
///    - Recovery: fix the description and retry
///
/// 2. **Start Errors** - `ActionStart`, `PartialStart`, `ControllerBusy`
///    - Raised by `start_action`
///    - `PartialStart` leaves hardware running; abort the listed controllers
///
/// 3. **Runtime Errors** - `ControllerCallback`, `AbortTimeout`, `Driver`
///    - Raised while an action is in progress
///    - Affected elements are already reported as `Fault`
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration validation failed.
    ///
    /// Occurs when a synchronization description parses correctly but cannot
    /// be turned into a generator configuration: no Time or Position domain,
    /// mixed domains, several time-domain groups, negative periods.
    ///
    /// **Error Type**: Permanent - requires changing the description.
    ///
    /// # Example
    ///
    /// ```rust
    /// use daq_core::error::DaqError;
    ///
    /// fn validate_repeats(repeats: i64) -> Result<(), DaqError> {
    ///     if repeats < 0 {
    ///         return Err(DaqError::Configuration(
    ///             "repeats must not be negative".into()
    ///         ));
    ///     }
    ///     Ok(())
    /// }
    /// ```
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A controller refused to start an axis.
    ///
    /// `PreStartOne` answered `false` and no axis of the action had been
    /// started, on this controller or any other. The action released its
    /// controllers.
    ///
    /// **Recovery Strategy**: Inspect the controller, fix and restart the action.
    #[error("Controller '{controller}' refused to start axis {axis}")]
    ActionStart {
        /// Controller that refused.
        controller: String,
        /// Axis it refused to start.
        axis: Axis,
    },

    /// Some axes started, others did not.
    ///
    /// Start is best-effort: every controller with at least one started axis
    /// is left running, stays claimed by the action and is listed in
    /// `started` so the caller can abort it.
    #[error(
        "Partial start: started [{}], failed [{}]",
        .started.join(", "),
        join_failures(.failed)
    )]
    PartialStart {
        /// Controllers with at least one started axis.
        started: Vec<String>,
        /// Where and why starting stopped.
        failed: Vec<StartFailure>,
    },

    /// A controller callback failed.
    ///
    /// **Error Type**: Usually permanent for the current action.
    ///
    /// **Recovery Strategy**: The element is marked `Fault`. Check the device.
    #[error(transparent)]
    ControllerCallback(#[from] CallbackError),

    /// The controller is already in use by another action.
    ///
    /// **Error Type**: Transient - retry once the owning action finishes.
    #[error("Controller '{controller}' is busy with action {owner}")]
    ControllerBusy {
        /// Requested controller.
        controller: String,
        /// Id of the action holding it.
        owner: String,
    },

    /// Elements kept reporting `Moving` after an abort.
    ///
    /// The listed elements were forced to `Fault` so that no element remains
    /// reported as moving.
    #[error("Abort timed out after {retries} state polls, still moving: {}", .elements.join(", "))]
    AbortTimeout {
        /// State polls made after the abort.
        retries: u32,
        /// Elements forced to `Fault`.
        elements: Vec<String>,
    },

    /// Operation not valid in the current action state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Driver error outside of an action callback.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_error_display_includes_axis() {
        let err = CallbackError {
            controller: "tg_ctrl".into(),
            verb: "StartOne",
            axis: Some(2),
            source: DriverError::new("tg_ctrl", DriverErrorKind::Hardware, "boom"),
        };
        assert_eq!(
            err.to_string(),
            "StartOne failed on controller 'tg_ctrl' axis 2: boom"
        );
    }

    #[test]
    fn test_partial_start_lists_controllers() {
        let err = DaqError::PartialStart {
            started: vec!["ctrl_a".into(), "ctrl_b".into()],
            failed: vec![StartFailure {
                controller: "ctrl_c".into(),
                axis: Some(1),
                reason: "refused".into(),
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("ctrl_a, ctrl_b"), "{msg}");
        assert!(msg.contains("ctrl_c[1]: refused"), "{msg}");
    }

    #[test]
    fn test_driver_error_converts() {
        let err: DaqError = DriverError::unknown_axis("motctrl", 7).into();
        assert!(matches!(err, DaqError::Driver(ref e) if e.kind == DriverErrorKind::InvalidParameter));
    }
}
