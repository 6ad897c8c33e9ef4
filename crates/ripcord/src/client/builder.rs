// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use super::{Client, ClientInner};
use crate::breaker::{CircuitBreaker, CircuitBreakerConfig, OnTransition, Transition};
use crate::dedup::DedupCache;
use crate::retry::{OnRetry, OnRetryArgs, Retryable};
use crate::telemetry::{ClientEvent, OnEvent, Telemetry};
use crate::{ClientConfig, ConfigError, Failure, ResultCaching, Transport};

/// Builds a [`Client`].
///
/// The builder starts from [`ClientConfig::default`]. Settings applied later override earlier ones,
/// so [`config`][Self::config] is usually called first.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use http::StatusCode;
/// use ripcord::{Client, FnTransport, Request, Response, ResultCaching, TransportError};
///
/// let transport = FnTransport::new(|_request: Request| async {
///     Ok::<_, TransportError>(Response::new(StatusCode::OK))
/// });
///
/// let client = Client::builder(transport)
///     .name("catalog")
///     .max_retries(2)
///     .backoff(Duration::from_millis(50), Duration::from_secs(2), 2.0)
///     .result_caching(ResultCaching::SafeMethods)
///     .on_retry(|args| println!("retry #{} in {:?}", args.attempt(), args.retry_delay()))
///     .build()
///     .expect("valid configuration");
///
/// assert_eq!(client.name(), "catalog");
/// ```
pub struct ClientBuilder<T> {
    transport: T,
    config: ClientConfig,
    telemetry: Telemetry,
    on_event: Option<OnEvent>,
    retryable: Option<Retryable>,
    on_retry: Option<OnRetry>,
    on_transition: Option<OnTransition>,
}

impl<T> Debug for ClientBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("name", &self.telemetry.client_name())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ClientBuilder<T> {
    pub(super) fn new(transport: T) -> Self {
        Self {
            transport,
            config: ClientConfig::default(),
            telemetry: Telemetry::default(),
            on_event: None,
            retryable: None,
            on_retry: None,
            on_transition: None,
        }
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(self, config: ClientConfig) -> Self {
        Self { config, ..self }
    }

    /// Sets the name reported in logs and metrics.
    #[must_use]
    pub fn name(self, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            telemetry: self.telemetry.with_client_name(name.into()),
            ..self
        }
    }

    /// Sets the number of retries after the first attempt.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Sets the exponential backoff parameters.
    #[must_use]
    pub fn backoff(mut self, initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        self.config.initial_delay = initial_delay;
        self.config.max_delay = max_delay;
        self.config.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables backoff jitter.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.jitter = enabled;
        self
    }

    /// Sets the deadline of every transport call.
    #[must_use]
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.attempt_timeout = Some(timeout);
        self
    }

    /// Replaces the circuit breaker settings.
    #[must_use]
    pub fn circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker_enabled = breaker.enabled;
        self.config.failure_threshold = breaker.failure_threshold;
        self.config.reset_timeout = breaker.reset_timeout;
        self.config.half_open_probe_limit = breaker.half_open_probe_limit;
        self
    }

    /// Sets the lifetime of deduplication entries.
    #[must_use]
    pub fn dedup_ttl(mut self, ttl: Duration) -> Self {
        self.config.dedup_ttl = ttl;
        self
    }

    /// Turns deduplication off; every request reaches the transport.
    #[must_use]
    pub fn disable_dedup(mut self) -> Self {
        self.config.dedup_enabled = false;
        self
    }

    /// Sets when completed replies are reused.
    #[must_use]
    pub fn result_caching(mut self, caching: ResultCaching) -> Self {
        self.config.result_caching = caching;
        self
    }

    /// Replaces the default decision of which failures are retried.
    #[must_use]
    pub fn retryable(self, predicate: impl Fn(&Failure) -> bool + Send + Sync + 'static) -> Self {
        Self {
            retryable: Some(Retryable::new(predicate)),
            ..self
        }
    }

    /// Invokes `callback` before every retry.
    #[must_use]
    pub fn on_retry(self, callback: impl Fn(&OnRetryArgs) + Send + Sync + 'static) -> Self {
        Self {
            on_retry: Some(OnRetry::new(callback)),
            ..self
        }
    }

    /// Invokes `callback` for every [`ClientEvent`].
    #[must_use]
    pub fn on_event(self, callback: impl Fn(&ClientEvent) + Send + Sync + 'static) -> Self {
        Self {
            on_event: Some(OnEvent::new(callback)),
            ..self
        }
    }

    /// Invokes `callback` after every circuit state change.
    #[must_use]
    pub fn on_circuit_transition(self, callback: impl Fn(&Transition) + Send + Sync + 'static) -> Self {
        Self {
            on_transition: Some(OnTransition::new(callback)),
            ..self
        }
    }

    /// Reports events to the `resilience.event` counter of `meter_provider`.
    #[cfg(any(feature = "metrics", test))]
    #[must_use]
    pub fn enable_metrics(self, meter_provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        Self {
            telemetry: self.telemetry.with_meter_provider(meter_provider),
            ..self
        }
    }

    /// Validates the configuration and builds the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<Client<T>, ConfigError> {
        self.config.validate()?;

        let telemetry = self.telemetry.with_on_event(self.on_event);
        let retry = self.config.retry_policy().with_retryable(self.retryable).with_on_retry(self.on_retry);
        let breaker =
            CircuitBreaker::with_telemetry(self.config.circuit_breaker(), telemetry.clone()).with_on_transition(self.on_transition);
        let dedup = DedupCache::new(self.config.dedup_ttl);

        tracing::event!(
            name: "ripcord.client.built",
            tracing::Level::DEBUG,
            client.name = telemetry.client_name(),
            resilience.max_retries = self.config.max_retries,
            circuit.failure_threshold = self.config.failure_threshold,
            dedup.enabled = self.config.dedup_enabled,
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                config: self.config,
                transport: self.transport,
                retry,
                breaker,
                dedup,
                telemetry,
            }),
        })
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::{FnTransport, Request, Response, TransportError};

    fn transport() -> impl Transport {
        FnTransport::new(|_request: Request| async { Ok::<_, TransportError>(Response::new(StatusCode::OK)) })
    }

    #[test]
    fn setters_update_config() {
        let client = Client::builder(transport())
            .max_retries(7)
            .backoff(Duration::from_millis(10), Duration::from_millis(500), 3.0)
            .jitter(false)
            .attempt_timeout(Duration::from_secs(2))
            .circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 9,
                ..CircuitBreakerConfig::default()
            })
            .dedup_ttl(Duration::from_secs(1))
            .result_caching(ResultCaching::SafeMethods)
            .build()
            .unwrap();

        let config = client.config();
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.initial_delay, Duration::from_millis(10));
        assert_eq!(config.max_delay, Duration::from_millis(500));
        assert!(!config.jitter);
        assert_eq!(config.attempt_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.failure_threshold, 9);
        assert_eq!(config.dedup_ttl, Duration::from_secs(1));
        assert_eq!(config.result_caching, ResultCaching::SafeMethods);
        assert_eq!(client.breaker().config().failure_threshold, 9);
        assert_eq!(client.retry_policy().max_attempts(), 8);
        assert_eq!(client.name(), "default");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = Client::builder(transport())
            .backoff(Duration::from_secs(1), Duration::from_secs(2), 0.5)
            .build();

        assert!(matches!(result, Err(ConfigError::InvalidMultiplier(_))));
    }

    #[test]
    fn disable_dedup_allows_zero_ttl() {
        let client = Client::builder(transport()).dedup_ttl(Duration::ZERO).disable_dedup().build();

        assert!(client.is_ok());
    }

    #[test]
    fn debug_shows_name() {
        let builder = Client::builder(transport()).name("billing");

        assert!(format!("{builder:?}").contains("billing"));
    }
}
