//! Action settings.

use daq_core::error::{AppResult, DaqError};
use daq_core::limits::{DEFAULT_ABORT_RETRIES, DEFAULT_NAP};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing of the action loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSettings {
    /// Pause between two state polls, e.g. "200ms"
    #[serde(default = "default_nap", with = "humantime_serde")]
    pub nap: Duration,
    /// State polls allowed after an abort before elements still moving are
    /// declared faulty
    #[serde(default = "default_abort_retries")]
    pub abort_retries: u32,
}

// Default value functions
fn default_nap() -> Duration {
    DEFAULT_NAP
}

fn default_abort_retries() -> u32 {
    DEFAULT_ABORT_RETRIES
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            nap: default_nap(),
            abort_retries: default_abort_retries(),
        }
    }
}

impl ActionSettings {
    /// Rejects a zero nap or zero abort retries.
    pub fn validate(&self) -> AppResult<()> {
        if self.nap.is_zero() {
            return Err(DaqError::Configuration("action nap must be positive".into()));
        }
        if self.abort_retries == 0 {
            return Err(DaqError::Configuration(
                "abort_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Upper bound of the time spent polling after an abort.
    pub fn abort_timeout(&self) -> Duration {
        self.nap * (self.abort_retries + 1)
    }
}
