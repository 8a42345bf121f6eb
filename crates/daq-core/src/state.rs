//! Element states, limit switches and the controller state report.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operational state of a pool element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum State {
    /// Idle and ready.
    On,
    /// Moving, generating or acquiring.
    Moving,
    /// Hardware or callback failure.
    Fault,
    /// Operational but outside the nominal range (e.g. on a limit switch).
    Alarm,
    /// Never queried.
    #[default]
    Unknown,
}

impl State {
    /// `true` only for `Moving`.
    pub fn is_moving(self) -> bool {
        matches!(self, State::Moving)
    }

    /// Status text used when the controller does not provide one.
    pub fn default_status(self) -> &'static str {
        match self {
            State::On => "Stopped",
            State::Moving => "In progress",
            State::Fault => "Fault",
            State::Alarm => "Alarm",
            State::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            State::On => "On",
            State::Moving => "Moving",
            State::Fault => "Fault",
            State::Alarm => "Alarm",
            State::Unknown => "Unknown",
        };
        write!(f, "{}", label)
    }
}

bitflags! {
    /// Limit switches reported by motion controllers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LimitSwitches: u8 {
        /// Home switch.
        const HOME = 1;
        /// Upper limit.
        const UPPER = 1 << 1;
        /// Lower limit.
        const LOWER = 1 << 2;
    }
}

/// Result of `StateOne`.
///
/// Controllers may report only a state, a state with status text, or a state
/// with status text and limit switches. The caller resolves the variant into an
/// [`ElementStatus`].
#[derive(Debug, Clone, PartialEq)]
pub enum StateReport {
    /// State only.
    State(State),
    /// State and status text.
    WithStatus(State, String),
    /// State, status text and limit switches.
    WithLimits(State, String, LimitSwitches),
}

impl StateReport {
    /// The reported state, whatever the variant.
    pub fn state(&self) -> State {
        match self {
            StateReport::State(s)
            | StateReport::WithStatus(s, _)
            | StateReport::WithLimits(s, _, _) => *s,
        }
    }

    /// Fills in the default status text when none was reported.
    pub fn resolve(self) -> ElementStatus {
        match self {
            StateReport::State(state) => ElementStatus::new(state),
            StateReport::WithStatus(state, status) => ElementStatus {
                state,
                status,
                limits: LimitSwitches::empty(),
            },
            StateReport::WithLimits(state, status, limits) => ElementStatus {
                state,
                status,
                limits,
            },
        }
    }
}

impl From<State> for StateReport {
    fn from(state: State) -> Self {
        StateReport::State(state)
    }
}

/// Resolved state of one element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementStatus {
    /// Element state.
    pub state: State,
    /// Status text, never empty.
    pub status: String,
    /// Active limit switches. Empty for non-motors.
    pub limits: LimitSwitches,
}

impl ElementStatus {
    /// Status with the default text for `state`.
    pub fn new(state: State) -> Self {
        Self {
            state,
            status: state.default_status().to_string(),
            limits: LimitSwitches::empty(),
        }
    }

    /// `Fault` with the given message as status.
    pub fn fault(message: impl Into<String>) -> Self {
        Self {
            state: State::Fault,
            status: message.into(),
            limits: LimitSwitches::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_plain_state_uses_default_status() {
        let status = StateReport::State(State::On).resolve();
        assert_eq!(status.state, State::On);
        assert_eq!(status.status, "Stopped");
        assert!(status.limits.is_empty());
    }

    #[test]
    fn test_resolve_with_limits() {
        let report = StateReport::WithLimits(
            State::Alarm,
            "upper limit active".into(),
            LimitSwitches::UPPER,
        );
        assert_eq!(report.state(), State::Alarm);
        let status = report.resolve();
        assert!(status.limits.contains(LimitSwitches::UPPER));
        assert!(!status.limits.contains(LimitSwitches::HOME));
        assert_eq!(status.status, "upper limit active");
    }
}
