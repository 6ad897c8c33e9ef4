// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use http::StatusCode;

use crate::breaker::CircuitBreakerConfig;
use crate::constants::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_DEDUP_TTL, DEFAULT_FAILURE_THRESHOLD, DEFAULT_HALF_OPEN_PROBE_LIMIT, DEFAULT_INITIAL_DELAY,
    DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, DEFAULT_RESET_TIMEOUT, DEFAULT_RETRYABLE_STATUSES, DEFAULT_USE_JITTER,
};
use crate::retry::RetryPolicy;
use crate::{Backoff, ConfigError};

/// Whether completed replies are reused for identical requests.
///
/// In-flight coalescing does not depend on this setting: while deduplication is enabled, identical
/// concurrent requests always share one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ResultCaching {
    /// Completed replies are only reused by requests that opt in with
    /// [`Request::cache_result`][crate::Request::cache_result].
    #[default]
    Disabled,
    /// Successful replies to `GET`, `HEAD`, `OPTIONS` and `TRACE` are reused for the rest of the
    /// entry lifetime.
    SafeMethods,
}

/// Every tunable of a [`Client`][crate::Client].
///
/// All fields have defaults, so configurations are usually written as
///
/// ```
/// use std::time::Duration;
/// use ripcord::ClientConfig;
///
/// let config = ClientConfig {
///     max_retries: 5,
///     initial_delay: Duration::from_millis(200),
///     ..ClientConfig::default()
/// };
///
/// assert!(config.validate().is_ok());
/// ```
///
/// With the `serde` feature, configurations can also be loaded from any serde format. Durations
/// are written as integer milliseconds with an `_ms` suffix:
///
/// ```json
/// { "max_retries": 2, "initial_delay_ms": 100, "reset_timeout_ms": 30000, "result_caching": "safe_methods" }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct ClientConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Delay before the first retry.
    #[cfg_attr(feature = "serde", serde(rename = "initial_delay_ms", with = "millis"))]
    pub initial_delay: Duration,

    /// Upper bound of any retry delay.
    #[cfg_attr(feature = "serde", serde(rename = "max_delay_ms", with = "millis"))]
    pub max_delay: Duration,

    /// Growth factor between consecutive delays; must be greater than one.
    pub backoff_multiplier: f64,

    /// Adds up to ten percent of random jitter to every delay.
    pub jitter: bool,

    /// Server statuses retried by the default classification.
    pub retryable_statuses: Vec<u16>,

    /// Lets a `Retry-After` hint lengthen the backoff delay, up to `max_delay`.
    pub honor_retry_after: bool,

    /// Deadline of each transport call. Requests may override it.
    #[cfg_attr(feature = "serde", serde(rename = "attempt_timeout_ms", with = "millis_opt"))]
    pub attempt_timeout: Option<Duration>,

    /// Whether the circuit breaker is active.
    pub circuit_breaker_enabled: bool,

    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Time an open circuit waits before probing.
    #[cfg_attr(feature = "serde", serde(rename = "reset_timeout_ms", with = "millis"))]
    pub reset_timeout: Duration,

    /// Probes admitted while half-open, and successes needed to close.
    pub half_open_probe_limit: u32,

    /// Whether identical requests are deduplicated.
    pub dedup_enabled: bool,

    /// Lifetime of a deduplication entry.
    #[cfg_attr(feature = "serde", serde(rename = "dedup_ttl_ms", with = "millis"))]
    pub dedup_ttl: Duration,

    /// Reuse of completed replies.
    pub result_caching: ResultCaching,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: DEFAULT_USE_JITTER,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
            honor_retry_after: true,
            attempt_timeout: None,
            circuit_breaker_enabled: true,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            half_open_probe_limit: DEFAULT_HALF_OPEN_PROBE_LIMIT,
            dedup_enabled: true,
            dedup_ttl: DEFAULT_DEDUP_TTL,
            result_caching: ResultCaching::Disabled,
        }
    }
}

impl ClientConfig {
    /// Checks the configuration for values that cannot work.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 1.0 {
            return Err(ConfigError::InvalidMultiplier(self.backoff_multiplier));
        }

        if self.initial_delay > self.max_delay {
            return Err(ConfigError::DelayOrder {
                initial: self.initial_delay,
                max: self.max_delay,
            });
        }

        if let Some(status) = self.retryable_statuses.iter().find(|status| !(500..=599).contains(*status)) {
            return Err(ConfigError::InvalidStatus(*status));
        }

        if self.dedup_enabled && self.dedup_ttl.is_zero() {
            return Err(ConfigError::ZeroDedupTtl);
        }

        self.circuit_breaker().validate()
    }

    /// Returns the breaker part of the configuration.
    #[must_use]
    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: self.circuit_breaker_enabled,
            failure_threshold: self.failure_threshold,
            reset_timeout: self.reset_timeout,
            half_open_probe_limit: self.half_open_probe_limit,
        }
    }

    /// Returns the backoff described by the configuration.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_delay, self.max_delay, self.backoff_multiplier).jitter(self.jitter)
    }

    /// Returns the retry policy described by the configuration, without callbacks.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.backoff())
            .retryable_statuses(self.retryable_statuses.iter().filter_map(|code| StatusCode::from_u16(*code).ok()))
            .honor_retry_after(self.honor_retry_after)
    }
}

#[cfg(feature = "serde")]
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(feature = "serde")]
mod millis_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[expect(clippy::ref_option, reason = "signature required by serde(with)")]
    pub(super) fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|millis| millis.map(Duration::from_millis))
    }
}
