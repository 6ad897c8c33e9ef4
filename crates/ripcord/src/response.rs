// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use bytes::Bytes;
use http::header::RETRY_AFTER;
use http::{HeaderMap, StatusCode};

use crate::breaker::CircuitState;

/// A response as produced by the [`Transport`][crate::Transport].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Creates a response with the given status, no headers and an empty body.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Replaces the headers.
    #[must_use]
    pub fn with_headers(self, headers: HeaderMap) -> Self {
        Self { headers, ..self }
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(self, body: impl Into<Bytes>) -> Self {
        Self { body: body.into(), ..self }
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Parses a `Retry-After` header expressed in whole seconds.
    ///
    /// HTTP-date values are ignored.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        let value = self.headers.get(RETRY_AFTER)?.to_str().ok()?;
        value.trim().parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Where a [`Reply`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Source {
    /// This caller's own transport call.
    Network,
    /// A concurrent identical request that was already in flight.
    Coalesced,
    /// A recently completed identical request, reused within the dedup TTL.
    Cached,
}

/// Timing and resilience metadata attached to every [`Reply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub(crate) attempts: u32,
    pub(crate) elapsed: Duration,
    pub(crate) breaker_state: CircuitState,
    pub(crate) source: Source,
}

impl Metadata {
    /// Number of transport calls made, including the first.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Total time from the first attempt to the final outcome, including backoff delays.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// The circuit state observed when the reply was produced.
    #[must_use]
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker_state
    }

    /// Where the reply came from.
    #[must_use]
    pub fn source(&self) -> Source {
        self.source
    }
}

/// A successful outcome of [`Client::execute`][crate::Client::execute].
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    response: Response,
    metadata: Metadata,
}

impl Reply {
    pub(crate) fn new(response: Response, metadata: Metadata) -> Self {
        Self { response, metadata }
    }

    pub(crate) fn with_source(mut self, source: Source) -> Self {
        self.metadata.source = source;
        self
    }

    /// Returns the response.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Returns the body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        self.response.body()
    }

    /// Returns the metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Consumes the reply, returning the response.
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }
}
