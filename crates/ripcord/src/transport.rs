// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::time::Duration;

use crate::{Request, Response};

/// The underlying call that the client protects.
///
/// A transport performs exactly one request and reports what happened. Connection pooling, TLS
/// and redirects are the transport's business; retries, circuit breaking and deduplication are
/// layered on top by [`Client`][crate::Client].
///
/// Implementations must return `Err` only when the request could not be completed at the
/// transport level (connection refused, DNS failure, reset). Any response received from the
/// service, whatever its status, is returned as `Ok`.
pub trait Transport: Send + Sync + 'static {
    /// Sends a single request.
    fn send(&self, request: Request) -> impl Future<Output = Result<Response, TransportError>> + Send;
}

/// Adapts an async closure into a [`Transport`].
///
/// # Examples
///
/// ```
/// use http::StatusCode;
/// use ripcord::{FnTransport, Request, Response, TransportError};
///
/// let transport = FnTransport::new(|_request: Request| async {
///     Ok::<_, TransportError>(Response::new(StatusCode::OK))
/// });
/// # let _ = transport;
/// ```
pub struct FnTransport<F>(F);

impl<F> FnTransport<F> {
    /// Wraps the closure.
    pub fn new(send: F) -> Self {
        Self(send)
    }
}

impl<F> Debug for FnTransport<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTransport").finish_non_exhaustive()
    }
}

impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, TransportError>> + Send,
{
    fn send(&self, request: Request) -> impl Future<Output = Result<Response, TransportError>> + Send {
        (self.0)(request)
    }
}

/// What went wrong below the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TransportErrorKind {
    /// The destination could not be reached (refused, unreachable, name resolution).
    Connect,
    /// The attempt did not finish within its deadline.
    Timeout,
    /// The connection broke while the request was in progress.
    Io,
    /// The task driving the request ended without producing an outcome.
    Aborted,
    /// Anything else.
    Other,
}

impl TransportErrorKind {
    /// Returns a short `snake_case` label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Io => "io",
            Self::Aborted => "aborted",
            Self::Other => "other",
        }
    }
}

impl Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request could not be completed at the transport level.
///
/// Transport errors are retryable unless a custom predicate says otherwise, and they count as
/// failures for the circuit breaker.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: Cow<'static, str>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    /// Creates an error of the given kind.
    pub fn new(kind: TransportErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`TransportErrorKind::Connect`] error.
    pub fn connect(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    /// The attempt exceeded `limit`.
    #[must_use]
    pub fn timeout(limit: Duration) -> Self {
        Self::new(TransportErrorKind::Timeout, format!("attempt timed out after {limit:?}"))
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source(self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            source: Some(Arc::new(source)),
            ..self
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
