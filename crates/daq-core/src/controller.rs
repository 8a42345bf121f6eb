//! Controller callback protocol.
//!
//! Every verb follows the same four-step shape, driven by the action layer:
//!
//! ```text
//! Pre<Verb>All → Pre<Verb>One(axis)… → <Verb>One(axis)… → <Verb>All
//! ```
//!
//! All methods take `&self`; controllers synchronize internally. Only
//! `state_one`, `stop_one` and `abort_one` are mandatory, the remaining steps
//! default to no-ops.
//!
//! Optional capabilities are exposed through explicit accessors
//! ([`Controller::as_synchronizable`], [`Controller::as_listener_capable`])
//! rather than discovered at runtime.

use crate::error::{DriverError, DriverErrorKind};
use crate::event::Listener;
use crate::state::StateReport;
use crate::synchronization::SynchronizationDescription;
use std::sync::Arc;

/// Axis index within a controller.
pub type Axis = u32;

/// Result type for controller callbacks.
pub type DriverResult<T> = Result<T, DriverError>;

/// A hardware or software controller owning one or more axes.
///
/// Callbacks may be invoked from any thread, but the action layer never calls
/// two verbs of the same controller concurrently.
pub trait Controller: Send + Sync {
    /// Unique controller name.
    fn name(&self) -> &str;

    /// Registers `axis` with the controller.
    fn add_device(&self, _axis: Axis) -> DriverResult<()> {
        Ok(())
    }

    /// Unregisters `axis`, stopping anything it is doing.
    fn delete_device(&self, _axis: Axis) -> DriverResult<()> {
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Start
    // -------------------------------------------------------------------------

    /// Opens a start sequence.
    fn pre_start_all(&self) -> DriverResult<()> {
        Ok(())
    }

    /// Returns `false` to refuse starting `axis`.
    fn pre_start_one(&self, _axis: Axis, _value: Option<f64>) -> DriverResult<bool> {
        Ok(true)
    }

    /// Loads `axis` for the start. Motion begins at [`Controller::start_all`].
    fn start_one(&self, _axis: Axis, _value: Option<f64>) -> DriverResult<()> {
        Ok(())
    }

    /// Starts every axis loaded since [`Controller::pre_start_all`].
    fn start_all(&self) -> DriverResult<()> {
        Ok(())
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    /// Opens a state poll.
    fn pre_state_all(&self) -> DriverResult<()> {
        Ok(())
    }

    /// Adds `axis` to the state poll.
    fn pre_state_one(&self, _axis: Axis) -> DriverResult<()> {
        Ok(())
    }

    /// Reads the state of every axis added to the poll.
    fn state_all(&self) -> DriverResult<()> {
        Ok(())
    }

    /// State of `axis`, with optional status text and limit switches.
    fn state_one(&self, axis: Axis) -> DriverResult<StateReport>;

    // -------------------------------------------------------------------------
    // Read
    // -------------------------------------------------------------------------

    /// Opens a value read.
    fn pre_read_all(&self) -> DriverResult<()> {
        Ok(())
    }

    /// Adds `axis` to the value read.
    fn pre_read_one(&self, _axis: Axis) -> DriverResult<()> {
        Ok(())
    }

    /// Reads every axis added to the read.
    fn read_all(&self) -> DriverResult<()> {
        Ok(())
    }

    /// Value of `axis`: position of a motor, count of a counter.
    fn read_one(&self, _axis: Axis) -> DriverResult<f64> {
        Err(DriverError::new(
            self.name(),
            DriverErrorKind::Unsupported,
            "controller does not support reading",
        ))
    }

    // -------------------------------------------------------------------------
    // Stop / Abort
    // -------------------------------------------------------------------------

    /// Opens a stop sequence.
    fn pre_stop_all(&self) -> DriverResult<()> {
        Ok(())
    }

    /// Adds `axis` to the stop sequence.
    fn pre_stop_one(&self, _axis: Axis) -> DriverResult<()> {
        Ok(())
    }

    /// Stops `axis` in a controlled way.
    fn stop_one(&self, axis: Axis) -> DriverResult<()>;

    /// Closes the stop sequence.
    fn stop_all(&self) -> DriverResult<()> {
        Ok(())
    }

    /// Opens an abort sequence.
    fn pre_abort_all(&self) -> DriverResult<()> {
        Ok(())
    }

    /// Adds `axis` to the abort sequence.
    fn pre_abort_one(&self, _axis: Axis) -> DriverResult<()> {
        Ok(())
    }

    /// Stops `axis` as fast as possible.
    fn abort_one(&self, axis: Axis) -> DriverResult<()>;

    /// Closes the abort sequence.
    fn abort_all(&self) -> DriverResult<()> {
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Capabilities
    // -------------------------------------------------------------------------

    /// Synchronization capability, if the controller has one.
    fn as_synchronizable(&self) -> Option<&dyn Synchronizable> {
        None
    }

    /// Listener capability, if the controller has one.
    fn as_listener_capable(&self) -> Option<&dyn ListenerCapable> {
        None
    }
}

/// Controllers whose axes accept a synchronization description.
pub trait Synchronizable: Send + Sync {
    /// Stores `description` for `axis`. Interpretation is deferred to the start.
    fn set_configuration(
        &self,
        axis: Axis,
        description: &SynchronizationDescription,
    ) -> DriverResult<()>;

    /// Returns the description last set on `axis`, unchanged.
    fn get_configuration(&self, axis: Axis) -> DriverResult<SynchronizationDescription>;
}

/// Controllers that report generation events to external listeners.
pub trait ListenerCapable: Send + Sync {
    /// Adds `listener` to the Active/Passive events of `axis`.
    fn add_listener(&self, axis: Axis, listener: Arc<dyn Listener>) -> DriverResult<()>;

    /// Removes a listener added with [`ListenerCapable::add_listener`].
    fn remove_listener(&self, axis: Axis, listener: &Arc<dyn Listener>) -> DriverResult<()>;

    /// Listener to be fed with moveable positions for position-domain
    /// generation. Requesting it switches the axis to position generation.
    fn position_listener(&self, axis: Axis) -> Option<Arc<dyn Listener>>;

    /// Detaches the position feed obtained from [`position_listener`].
    ///
    /// [`position_listener`]: ListenerCapable::position_listener
    fn release_position_listener(&self, _axis: Axis) {}
}
