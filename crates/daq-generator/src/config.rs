//! Generator settings.

use daq_core::error::{AppResult, DaqError};
use daq_core::limits::{DEFAULT_MAX_NAP, MIN_MAX_NAP};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by the software generators of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Longest uninterrupted sleep while generating, e.g. "100ms"
    #[serde(default = "default_max_nap", with = "humantime_serde")]
    pub max_nap: Duration,
}

fn default_max_nap() -> Duration {
    DEFAULT_MAX_NAP
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            max_nap: default_max_nap(),
        }
    }
}

impl GeneratorSettings {
    /// Rejects a `max_nap` below the minimum.
    pub fn validate(&self) -> AppResult<()> {
        if self.max_nap < MIN_MAX_NAP {
            return Err(DaqError::Configuration(format!(
                "generator max_nap must be at least {:?}, got {:?}",
                MIN_MAX_NAP, self.max_nap
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_humantime() {
        let settings: GeneratorSettings = toml::from_str("").unwrap();
        assert_eq!(settings, GeneratorSettings::default());

        let settings: GeneratorSettings = toml::from_str(r#"max_nap = "25ms""#).unwrap();
        assert_eq!(settings.max_nap, Duration::from_millis(25));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_nap() {
        let settings = GeneratorSettings {
            max_nap: Duration::ZERO,
        };
        assert!(matches!(settings.validate(), Err(DaqError::Configuration(_))));
    }
}
