// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Retry configuration and outcome classification.
//!
//! A [`RetryPolicy`] decides, for every attempt, whether the outcome is a success, a failure worth
//! retrying or a failure that ends the request, and how long to wait before the next attempt.
//!
//! By default transport errors and the configured server statuses (500, 502, 503 and 504) are
//! retried, while client errors never are. A custom predicate set with
//! [`RetryPolicy::retryable`] replaces this decision.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use http::StatusCode;
//! use ripcord::retry::{Classification, RetryPolicy};
//! use ripcord::{Backoff, Failure, Response};
//!
//! let policy = RetryPolicy::new(2, Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 2.0))
//!     .retryable(|failure: &Failure| failure.status() != Some(StatusCode::NOT_IMPLEMENTED));
//!
//! let outcome = policy.classify(Ok(Response::new(StatusCode::BAD_GATEWAY)));
//!
//! assert!(matches!(outcome, Classification::Retryable(_)));
//! assert_eq!(policy.max_attempts(), 3);
//! ```

mod args;

use std::cmp::{max, min};
use std::time::Duration;

pub use args::OnRetryArgs;
use http::StatusCode;

use crate::breaker::ExecutionResult;
use crate::constants::DEFAULT_RETRYABLE_STATUSES;
use crate::fn_wrapper::define_fn_wrapper;
use crate::{Backoff, Failure, Response, TransportError};

define_fn_wrapper!(Retryable(Fn(failure: &Failure) -> bool));
define_fn_wrapper!(OnRetry(Fn(args: &OnRetryArgs)));

/// The outcome of a single attempt.
#[derive(Debug, Clone)]
pub enum Classification {
    /// The service answered with a status below 400.
    Success(Response),
    /// The attempt failed and may be retried.
    Retryable(Failure),
    /// The attempt failed and must not be retried.
    Terminal(Failure),
}

impl Classification {
    /// How the outcome is reported to the circuit breaker.
    ///
    /// Client errors are reported as successes: the service answered, so it is healthy.
    #[must_use]
    pub fn execution_result(&self) -> ExecutionResult {
        match self {
            Self::Success(_) => ExecutionResult::Success,
            Self::Retryable(failure) | Self::Terminal(failure) => {
                if failure.counts_against_breaker() {
                    ExecutionResult::Failure
                } else {
                    ExecutionResult::Success
                }
            }
        }
    }
}

/// Immutable retry settings of a client.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Backoff,
    retryable_statuses: Vec<StatusCode>,
    honor_retry_after: bool,
    retryable: Option<Retryable>,
    on_retry: Option<OnRetry>,
}

impl RetryPolicy {
    /// Creates a policy making up to `max_retries` retries after the first attempt.
    #[must_use]
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES
                .iter()
                .filter_map(|code| StatusCode::from_u16(*code).ok())
                .collect(),
            honor_retry_after: true,
            retryable: None,
            on_retry: None,
        }
    }

    /// Sets the server statuses retried by the default classification.
    #[must_use]
    pub fn retryable_statuses(self, statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        Self {
            retryable_statuses: statuses.into_iter().collect(),
            ..self
        }
    }

    /// Whether a `Retry-After` hint may lengthen the backoff delay.
    #[must_use]
    pub fn honor_retry_after(self, enabled: bool) -> Self {
        Self {
            honor_retry_after: enabled,
            ..self
        }
    }

    /// Replaces the default decision of which failures are retried.
    #[must_use]
    pub fn retryable(self, predicate: impl Fn(&Failure) -> bool + Send + Sync + 'static) -> Self {
        self.with_retryable(Some(Retryable::new(predicate)))
    }

    /// Invokes `callback` before every retry, with the failure and the chosen delay.
    #[must_use]
    pub fn on_retry(self, callback: impl Fn(&OnRetryArgs) + Send + Sync + 'static) -> Self {
        self.with_on_retry(Some(OnRetry::new(callback)))
    }

    pub(crate) fn with_retryable(self, retryable: Option<Retryable>) -> Self {
        Self { retryable, ..self }
    }

    pub(crate) fn with_on_retry(self, on_retry: Option<OnRetry>) -> Self {
        Self { on_retry, ..self }
    }

    /// Returns the number of retries after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the total number of attempts, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns the backoff.
    #[must_use]
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Returns `true` when `failure` may be retried.
    #[must_use]
    pub fn is_retryable(&self, failure: &Failure) -> bool {
        if let Some(retryable) = &self.retryable {
            return retryable.call(failure);
        }

        match failure {
            Failure::Transport(_) => true,
            Failure::UpstreamServer(response) => self.retryable_statuses.contains(&response.status()),
            Failure::UpstreamClient(_) => false,
        }
    }

    /// Classifies the outcome of a transport call.
    #[must_use]
    pub fn classify(&self, outcome: Result<Response, TransportError>) -> Classification {
        let failure = match outcome {
            Ok(response) if response.status().as_u16() < 400 => return Classification::Success(response),
            Ok(response) if response.status().is_server_error() => Failure::UpstreamServer(response),
            Ok(response) => Failure::UpstreamClient(response),
            Err(error) => Failure::Transport(error),
        };

        if self.is_retryable(&failure) {
            Classification::Retryable(failure)
        } else {
            Classification::Terminal(failure)
        }
    }

    /// Returns how long to wait after `attempt` failed with `failure`.
    ///
    /// This is the backoff delay, lengthened to the service's `Retry-After` hint when one was sent
    /// and honored. The result never exceeds the maximum backoff delay.
    #[must_use]
    pub fn retry_delay(&self, attempt: u32, failure: &Failure) -> Duration {
        let delay = self.backoff.delay(attempt);

        match failure.retry_after().filter(|_| self.honor_retry_after) {
            Some(hint) => max(delay, min(hint, self.backoff.max_delay())),
            None => delay,
        }
    }

    pub(crate) fn notify_retry(&self, attempt: u32, retry_delay: Duration, failure: &Failure) {
        if let Some(on_retry) = &self.on_retry {
            on_retry.call(&OnRetryArgs {
                attempt,
                retry_delay,
                failure: failure.clone(),
            });
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use http::HeaderMap;
    use http::header::{HeaderValue, RETRY_AFTER};
    use rstest::rstest;

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Backoff::new(Duration::from_millis(100), Duration::from_secs(2), 2.0).jitter(false))
    }

    fn response(status: u16) -> Response {
        Response::new(StatusCode::from_u16(status).unwrap())
    }

    #[test]
    fn static_assertions() {
        static_assertions::assert_impl_all!(RetryPolicy: Send, Sync, Clone, std::fmt::Debug);
    }

    #[rstest]
    #[case(200, "success")]
    #[case(204, "success")]
    #[case(304, "success")]
    #[case(400, "terminal")]
    #[case(404, "terminal")]
    #[case(429, "terminal")]
    #[case(500, "retryable")]
    #[case(501, "terminal")]
    #[case(502, "retryable")]
    #[case(503, "retryable")]
    #[case(504, "retryable")]
    fn default_classification(#[case] status: u16, #[case] expected: &str) {
        let actual = match policy().classify(Ok(response(status))) {
            Classification::Success(_) => "success",
            Classification::Retryable(_) => "retryable",
            Classification::Terminal(_) => "terminal",
        };

        assert_eq!(actual, expected);
    }

    #[test]
    fn transport_errors_are_retryable() {
        let outcome = policy().classify(Err(TransportError::connect("refused")));

        assert!(matches!(outcome, Classification::Retryable(Failure::Transport(_))));
    }

    #[test]
    fn custom_statuses_replace_defaults() {
        let policy = policy().retryable_statuses([StatusCode::NOT_IMPLEMENTED]);

        assert!(matches!(policy.classify(Ok(response(501))), Classification::Retryable(_)));
        assert!(matches!(policy.classify(Ok(response(503))), Classification::Terminal(_)));
    }

    #[test]
    fn predicate_overrides_default() {
        let policy = policy().retryable(|failure| failure.status() == Some(StatusCode::TOO_MANY_REQUESTS));

        assert!(matches!(policy.classify(Ok(response(429))), Classification::Retryable(_)));
        assert!(matches!(policy.classify(Ok(response(503))), Classification::Terminal(_)));
        assert!(matches!(
            policy.classify(Err(TransportError::connect("refused"))),
            Classification::Terminal(_)
        ));
    }

    #[test]
    fn execution_result_ignores_client_errors() {
        let policy = policy();

        assert_eq!(policy.classify(Ok(response(200))).execution_result(), ExecutionResult::Success);
        assert_eq!(policy.classify(Ok(response(404))).execution_result(), ExecutionResult::Success);
        assert_eq!(policy.classify(Ok(response(503))).execution_result(), ExecutionResult::Failure);
        assert_eq!(policy.classify(Ok(response(501))).execution_result(), ExecutionResult::Failure);
        assert_eq!(
            policy.classify(Err(TransportError::connect("refused"))).execution_result(),
            ExecutionResult::Failure
        );
    }

    #[test]
    fn attempts_budget() {
        assert_eq!(policy().max_retries(), 3);
        assert_eq!(policy().max_attempts(), 4);
        assert_eq!(RetryPolicy::new(u32::MAX, Backoff::new(Duration::ZERO, Duration::ZERO, 2.0)).max_attempts(), u32::MAX);
    }

    fn with_retry_after(seconds: &'static str) -> Failure {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static(seconds));
        Failure::UpstreamServer(response(503).with_headers(headers))
    }

    #[test]
    fn retry_delay_uses_backoff_without_hint() {
        let failure = Failure::UpstreamServer(response(503));

        assert_eq!(policy().retry_delay(1, &failure), Duration::from_millis(100));
        assert_eq!(policy().retry_delay(3, &failure), Duration::from_millis(400));
    }

    #[test]
    fn retry_after_lengthens_delay_up_to_max() {
        let policy = policy();

        assert_eq!(policy.retry_delay(1, &with_retry_after("1")), Duration::from_secs(1));
        assert_eq!(policy.retry_delay(1, &with_retry_after("30")), Duration::from_secs(2));
        assert_eq!(policy.retry_delay(1, &with_retry_after("0")), Duration::from_millis(100));
    }

    #[test]
    fn retry_after_can_be_ignored() {
        let policy = policy().honor_retry_after(false);

        assert_eq!(policy.retry_delay(1, &with_retry_after("1")), Duration::from_millis(100));
    }

    #[test]
    fn on_retry_receives_args() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let policy = policy().on_retry(move |args| {
            assert_eq!(args.attempt(), 2);
            assert_eq!(args.retry_delay(), Duration::from_millis(200));
            assert_eq!(args.failure().status(), Some(StatusCode::BAD_GATEWAY));
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        policy.notify_retry(2, Duration::from_millis(200), &Failure::UpstreamServer(response(502)));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
