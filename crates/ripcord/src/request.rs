// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};

/// A logical request issued through the [`Client`][crate::Client].
///
/// The request is cloned for every attempt, so the body is kept in cheaply cloneable form.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use http::Method;
/// use ripcord::Request;
///
/// let request = Request::post("https://api.example.com/orders")
///     .json(serde_json::json!({ "sku": "A-1", "qty": 2 }))
///     .timeout(Duration::from_secs(2))
///     .bypass_dedup();
///
/// assert_eq!(request.method(), &Method::POST);
/// assert!(request.options().bypasses_dedup());
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    target: String,
    headers: HeaderMap,
    body: Body,
    options: RequestOptions,
}

impl Request {
    /// Creates a request without headers or body.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            body: Body::Empty,
            options: RequestOptions::default(),
        }
    }

    /// Creates a `GET` request.
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    /// Creates a `POST` request.
    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    /// Creates a `PUT` request.
    pub fn put(target: impl Into<String>) -> Self {
        Self::new(Method::PUT, target)
    }

    /// Creates a `DELETE` request.
    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(Method::DELETE, target)
    }

    /// Adds a header, replacing any existing value with the same name.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(self, body: impl Into<Body>) -> Self {
        Self { body: body.into(), ..self }
    }

    /// Sets a structured JSON body.
    #[must_use]
    pub fn json(self, value: serde_json::Value) -> Self {
        self.body(Body::Json(value))
    }

    /// Overrides the per-attempt timeout configured on the client.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Skips deduplication for this request; it always reaches the transport (subject to the breaker).
    #[must_use]
    pub fn bypass_dedup(mut self) -> Self {
        self.options.bypass_dedup = true;
        self
    }

    /// Explicitly allows or forbids reusing a completed result for this request.
    ///
    /// When set, this overrides the client's [`ResultCaching`][crate::ResultCaching] policy for
    /// this request. Marking a mutating request as cacheable declares it idempotent.
    #[must_use]
    pub fn cache_result(mut self, enabled: bool) -> Self {
        self.options.cache_result = Some(enabled);
        self
    }

    /// Returns the method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the target URL or path.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the headers for modification.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns the body.
    #[must_use]
    pub fn body_ref(&self) -> &Body {
        &self.body
    }

    /// Returns the per-request options.
    #[must_use]
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }
}

/// Per-request overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    timeout: Option<Duration>,
    bypass_dedup: bool,
    cache_result: Option<bool>,
}

impl RequestOptions {
    /// The per-attempt timeout override, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether deduplication is skipped.
    #[must_use]
    pub fn bypasses_dedup(&self) -> bool {
        self.bypass_dedup
    }

    /// The explicit result caching choice, if any.
    #[must_use]
    pub fn cache_result(&self) -> Option<bool> {
        self.cache_result
    }
}

/// Request payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// No payload.
    #[default]
    Empty,
    /// Opaque bytes.
    Bytes(Bytes),
    /// A structured JSON value.
    Json(serde_json::Value),
}

impl Body {
    /// Returns `true` for [`Body::Empty`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Serializes the payload into bytes for the wire.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Bytes(bytes) => bytes.clone(),
            Self::Json(value) => Bytes::from(value.to_string()),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Bytes(Bytes::from(text))
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use http::header::{CONTENT_TYPE, HeaderValue};
    use serde_json::json;

    use super::*;

    #[test]
    fn builder_sets_fields() {
        let request = Request::put("/users/7")
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body("payload")
            .timeout(Duration::from_millis(300))
            .cache_result(true);

        assert_eq!(request.method(), &Method::PUT);
        assert_eq!(request.target(), "/users/7");
        assert_eq!(request.headers().get(CONTENT_TYPE).map(HeaderValue::as_bytes), Some(&b"application/json"[..]));
        assert_eq!(request.body_ref(), &Body::Bytes(Bytes::from_static(b"payload")));
        assert_eq!(request.options().timeout(), Some(Duration::from_millis(300)));
        assert_eq!(request.options().cache_result(), Some(true));
        assert!(!request.options().bypasses_dedup());
    }

    #[test]
    fn defaults_are_empty() {
        let request = Request::get("/health");

        assert!(request.body_ref().is_empty());
        assert!(request.headers().is_empty());
        assert_eq!(request.options(), &RequestOptions::default());
    }

    #[test]
    fn headers_mut_allows_edits() {
        let mut request = Request::delete("/items/1");
        request
            .headers_mut()
            .insert(HeaderName::from_static("x-request-id"), HeaderValue::from_static("abc"));

        assert!(request.headers().contains_key("x-request-id"));
    }

    #[test]
    fn body_to_bytes() {
        assert!(Body::Empty.to_bytes().is_empty());
        assert_eq!(Body::from(vec![1_u8, 2, 3]).to_bytes(), Bytes::from_static(&[1, 2, 3]));
        assert_eq!(Body::from(String::from("hi")).to_bytes(), Bytes::from_static(b"hi"));
        assert_eq!(Body::from(json!({ "a": 1 })).to_bytes(), Bytes::from_static(br#"{"a":1}"#));
    }
}
