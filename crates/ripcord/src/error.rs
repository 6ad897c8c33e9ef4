// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use http::StatusCode;

use crate::breaker::CircuitState;
use crate::{Response, TransportError};

/// Why a single attempt did not succeed.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Failure {
    /// The transport could not complete the request.
    #[error("{0}")]
    Transport(#[source] TransportError),
    /// The service answered with a 5xx status.
    #[error("upstream server error: {}", .0.status())]
    UpstreamServer(Response),
    /// The service answered with a 4xx status (or any other non-success status below 500).
    #[error("upstream client error: {}", .0.status())]
    UpstreamClient(Response),
}

impl Failure {
    /// Returns the status the service answered with, if it answered at all.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(Response::status)
    }

    /// Returns the response the service answered with, if it answered at all.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Transport(_) => None,
            Self::UpstreamServer(response) | Self::UpstreamClient(response) => Some(response),
        }
    }

    /// Returns the transport error, if this is a transport failure.
    #[must_use]
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(error) => Some(error),
            Self::UpstreamServer(_) | Self::UpstreamClient(_) => None,
        }
    }

    /// The `Retry-After` hint sent with the response, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.response().and_then(Response::retry_after)
    }

    /// Whether this failure says something about the health of the service.
    ///
    /// Client errors mean the request was bad, not the service, so they are not counted.
    #[must_use]
    pub fn counts_against_breaker(&self) -> bool {
        !matches!(self, Self::UpstreamClient(_))
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::UpstreamServer(_) => "upstream_server",
            Self::UpstreamClient(_) => "upstream_client",
        }
    }
}

/// The final outcome of a logical request that did not succeed.
///
/// The error is cloneable so that every caller coalesced onto the same in-flight request
/// receives it.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The circuit breaker rejected the request without contacting the service.
    #[error("circuit is {state}; request rejected after {attempts} attempt(s)")]
    CircuitOpen {
        /// Transport calls made before the rejection.
        attempts: u32,
        /// The state that caused the rejection.
        state: CircuitState,
    },

    /// Every attempt failed with a retryable failure.
    #[error("retries exhausted after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        /// Transport calls made.
        attempts: u32,
        /// The failure of the last attempt.
        #[source]
        last: Failure,
    },

    /// An attempt failed with a failure that is not retried.
    #[error("request failed after {attempts} attempt(s): {failure}")]
    Terminal {
        /// Transport calls made.
        attempts: u32,
        /// The failure that ended the request.
        #[source]
        failure: Failure,
    },
}

impl Error {
    /// Returns `true` when the circuit breaker rejected the request.
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Returns the failure of the last attempt, if one was made.
    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::CircuitOpen { .. } => None,
            Self::RetriesExhausted { last, .. } => Some(last),
            Self::Terminal { failure, .. } => Some(failure),
        }
    }

    /// Number of transport calls made.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::CircuitOpen { attempts, .. } | Self::RetriesExhausted { attempts, .. } | Self::Terminal { attempts, .. } => *attempts,
        }
    }

    /// The status of the last response, if the service answered.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.failure().and_then(Failure::status)
    }
}

/// A [`ClientConfig`][crate::ClientConfig] that cannot be used.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The backoff multiplier must be finite and greater than one.
    #[error("backoff multiplier must be finite and greater than 1.0, got {0}")]
    InvalidMultiplier(f64),

    /// The initial delay exceeds the maximum delay.
    #[error("initial delay {initial:?} exceeds max delay {max:?}")]
    DelayOrder {
        /// Configured initial delay.
        initial: Duration,
        /// Configured maximum delay.
        max: Duration,
    },

    /// The breaker would never open.
    #[error("failure threshold must be positive")]
    ZeroFailureThreshold,

    /// A half-open circuit would never admit a probe.
    #[error("half-open probe limit must be positive")]
    ZeroProbeLimit,

    /// Deduplication is enabled with a zero TTL.
    #[error("dedup TTL must be positive when deduplication is enabled")]
    ZeroDedupTtl,

    /// A retryable status is not a valid 5xx code.
    #[error("retryable status {0} is not a server error status")]
    InvalidStatus(u16),
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn static_assertions() {
        static_assertions::assert_impl_all!(Error: Send, Sync, Clone, std::error::Error);
        static_assertions::assert_impl_all!(Failure: Send, Sync, Clone, std::error::Error);
        static_assertions::assert_impl_all!(ConfigError: Send, Sync, std::error::Error);
    }

    #[test]
    fn failure_accessors() {
        let server = Failure::UpstreamServer(Response::new(StatusCode::BAD_GATEWAY));
        let client = Failure::UpstreamClient(Response::new(StatusCode::NOT_FOUND));
        let transport = Failure::Transport(TransportError::connect("refused"));

        assert_eq!(server.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(client.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(transport.status(), None);
        assert!(transport.transport_error().is_some());
        assert!(server.transport_error().is_none());

        assert!(server.counts_against_breaker());
        assert!(transport.counts_against_breaker());
        assert!(!client.counts_against_breaker());
    }

    #[test]
    fn failure_display() {
        assert_eq!(
            Failure::UpstreamServer(Response::new(StatusCode::SERVICE_UNAVAILABLE)).to_string(),
            "upstream server error: 503 Service Unavailable"
        );
        assert_eq!(
            Failure::Transport(TransportError::connect("refused")).to_string(),
            "connect error: refused"
        );
    }

    #[test]
    fn error_helpers() {
        let open = Error::CircuitOpen {
            attempts: 0,
            state: CircuitState::Open,
        };
        let exhausted = Error::RetriesExhausted {
            attempts: 3,
            last: Failure::UpstreamServer(Response::new(StatusCode::INTERNAL_SERVER_ERROR)),
        };

        assert!(open.is_circuit_open());
        assert!(open.failure().is_none());
        assert_eq!(open.status(), None);
        assert_eq!(open.to_string(), "circuit is open; request rejected after 0 attempt(s)");

        assert!(!exhausted.is_circuit_open());
        assert_eq!(exhausted.attempts(), 3);
        assert_eq!(exhausted.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(exhausted.source().is_some());
    }

    #[test]
    fn terminal_chains_transport_source() {
        let error = Error::Terminal {
            attempts: 1,
            failure: Failure::Transport(TransportError::connect("refused")),
        };

        let chain = error.source().and_then(std::error::Error::source).map(ToString::to_string);

        assert_eq!(chain.as_deref(), Some("connect error: refused"));
    }
}
