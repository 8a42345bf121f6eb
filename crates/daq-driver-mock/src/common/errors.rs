//! Error injection framework for mock controllers.
//!
//! Enables configurable callback failures for resilience testing of the
//! action layer. Operations are named after protocol verbs (`"StartOne"`,
//! `"StateOne"`, …); `"*"` matches every verb in a rate table.

use super::rng::MockRng;
use daq_core::controller::Axis;
use daq_core::error::{DriverError, DriverErrorKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Error injection configuration for mock controllers
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Per-operation failure rate (0.0 to 1.0)
    failure_rates: Arc<HashMap<&'static str, f64>>,
    /// Specific failure scenarios
    scenarios: Arc<Vec<ErrorScenario>>,
    /// RNG for failure decisions
    rng: Arc<MockRng>,
    /// State tracking for scenarios
    state: Arc<Mutex<ErrorState>>,
}

/// Failure injected into a mock controller.
#[derive(Debug, Clone)]
pub enum ErrorScenario {
    /// Fail after N successful calls of an operation
    FailAfterN {
        /// Controller verb, e.g. `StartOne`.
        operation: &'static str,
        /// Successful calls before the first failure.
        count: u32,
    },
    /// Timeout on a specific operation
    Timeout {
        /// Controller verb.
        operation: &'static str,
    },
    /// Always fail an operation on one axis
    FailOnAxis {
        /// Controller verb.
        operation: &'static str,
        /// Failing axis.
        axis: Axis,
    },
    /// Simulate communication loss (every later call fails)
    CommunicationLoss,
    /// Hardware fault with specific code (every later call fails)
    HardwareFault {
        /// Vendor fault code in the message.
        code: u32,
    },
}

#[derive(Default, Debug)]
struct ErrorState {
    /// Operation counters for FailAfterN scenarios
    operation_counts: HashMap<&'static str, u32>,
    /// Whether communication is lost
    communication_lost: bool,
    /// Hardware fault code (0 = no fault)
    hardware_fault_code: u32,
}

impl ErrorConfig {
    /// Create error config with no errors (default)
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Create error config with uniform random failures and specific seed
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate); // Wildcard for all operations
        Self::build(rates, Vec::new(), seed)
    }

    /// Create error config with a single scenario
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Create error config with multiple scenarios
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    /// Create error config with custom failure rates per operation
    pub fn with_rates(rates: HashMap<&'static str, f64>) -> Self {
        Self::build(rates, Vec::new(), None)
    }

    fn build(
        rates: HashMap<&'static str, f64>,
        scenarios: Vec<ErrorScenario>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    /// Check if an operation should fail and return the appropriate error
    pub fn check_operation(
        &self,
        driver_type: &str,
        operation: &'static str,
        axis: Option<Axis>,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();

        if state.communication_lost {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Communication,
                "Communication lost",
            ));
        }

        if state.hardware_fault_code != 0 {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Hardware,
                format!("Hardware fault: {}", state.hardware_fault_code),
            ));
        }

        for scenario in self.scenarios.iter() {
            match scenario {
                ErrorScenario::FailAfterN {
                    operation: op,
                    count,
                } if *op == operation => {
                    let current = state.operation_counts.entry(operation).or_insert(0);
                    *current += 1;
                    if *current > *count {
                        return Err(DriverError::new(
                            driver_type,
                            DriverErrorKind::Hardware,
                            format!("Injected failure after {} operations", count),
                        ));
                    }
                }
                ErrorScenario::Timeout { operation: op } if *op == operation => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Timeout,
                        format!("Operation '{}' timed out", operation),
                    ));
                }
                ErrorScenario::FailOnAxis {
                    operation: op,
                    axis: failing,
                } if *op == operation && axis == Some(*failing) => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Hardware,
                        format!("Injected '{}' failure on axis {}", operation, failing),
                    ));
                }
                ErrorScenario::CommunicationLoss => {
                    state.communication_lost = true;
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Communication,
                        "Communication lost",
                    ));
                }
                ErrorScenario::HardwareFault { code } => {
                    state.hardware_fault_code = *code;
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Hardware,
                        format!("Hardware fault: {}", code),
                    ));
                }
                _ => {}
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);

        if self.rng.should_fail(rate) {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Hardware,
                format!("Random failure on operation '{}'", operation),
            ));
        }

        Ok(())
    }

    /// Reset error state (clear counters, faults)
    pub fn reset(&self) {
        *self.state.lock() = ErrorState::default();
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_errors() {
        let config = ErrorConfig::none();
        for _ in 0..100 {
            assert!(config.check_operation("motctrl", "StateOne", Some(1)).is_ok());
        }
    }

    #[test]
    fn test_random_failures() {
        let config = ErrorConfig::random_failures_seeded(0.5, Some(42));
        let failures = (0..1000)
            .filter(|_| config.check_operation("motctrl", "ReadOne", None).is_err())
            .count();
        // Expect roughly 50% failures
        assert!(failures > 400 && failures < 600, "Got {} failures", failures);
    }

    #[test]
    fn test_fail_after_n() {
        let config = ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: "StateOne",
            count: 5,
        });

        for i in 0..5 {
            assert!(
                config.check_operation("motctrl", "StateOne", Some(1)).is_ok(),
                "Operation {} should succeed",
                i + 1
            );
        }
        for i in 5..10 {
            assert!(
                config.check_operation("motctrl", "StateOne", Some(1)).is_err(),
                "Operation {} should fail",
                i + 1
            );
        }
        // Other verbs are unaffected
        assert!(config.check_operation("motctrl", "StartOne", Some(1)).is_ok());
    }

    #[test]
    fn test_fail_on_axis_only_hits_that_axis() {
        let config = ErrorConfig::scenario(ErrorScenario::FailOnAxis {
            operation: "StartOne",
            axis: 2,
        });
        assert!(config.check_operation("ctctrl", "StartOne", Some(1)).is_ok());
        let err = config
            .check_operation("ctctrl", "StartOne", Some(2))
            .unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Hardware);
        assert!(config.check_operation("ctctrl", "StartOne", Some(3)).is_ok());
    }

    #[test]
    fn test_timeout_scenario() {
        let config = ErrorConfig::scenario(ErrorScenario::Timeout {
            operation: "StopOne",
        });
        let err = config.check_operation("motctrl", "StopOne", Some(1)).unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Timeout);
        assert!(err.message.contains("timed out"));
    }

    #[test]
    fn test_communication_loss_persists_until_reset() {
        let config = ErrorConfig::scenario(ErrorScenario::CommunicationLoss);

        let err = config.check_operation("motctrl", "StateOne", None).unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Communication);
        assert!(config.check_operation("motctrl", "ReadOne", None).is_err());

        config.reset();
        // The scenario triggers again on the next call after a reset.
        assert!(config.check_operation("motctrl", "ReadOne", None).is_err());
    }

    #[test]
    fn test_hardware_fault() {
        let config = ErrorConfig::scenario(ErrorScenario::HardwareFault { code: 42 });
        let err = config.check_operation("motctrl", "StartOne", Some(1)).unwrap_err();
        assert!(err.message.contains("42"));
        assert!(config.check_operation("motctrl", "StateOne", Some(1)).is_err());
    }
}
