// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::ConfigError;
use crate::constants::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_HALF_OPEN_PROBE_LIMIT, DEFAULT_RESET_TIMEOUT};

/// Settings of a [`CircuitBreaker`][super::CircuitBreaker].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// When `false`, every request is admitted and outcomes are not recorded.
    pub enabled: bool,

    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,

    /// How long the circuit stays open after the last failure before probing.
    pub reset_timeout: Duration,

    /// Probes admitted while half-open. The same number of successful probes closes the circuit.
    pub half_open_probe_limit: u32,
}

impl CircuitBreakerConfig {
    /// Checks that the breaker can both open and recover.
    ///
    /// # Errors
    ///
    /// Returns an error if the threshold or the probe limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }

        if self.half_open_probe_limit == 0 {
            return Err(ConfigError::ZeroProbeLimit);
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            half_open_probe_limit: DEFAULT_HALF_OPEN_PROBE_LIMIT,
        }
    }
}
