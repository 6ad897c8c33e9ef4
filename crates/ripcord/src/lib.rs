// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Resilient outbound API client.
//!
//! `ripcord` protects both the caller and a downstream service from cascading failure by wrapping
//! every outbound request in three mechanisms:
//!
//! - **Retry** with bounded exponential backoff and jitter, for transport errors and selected server
//!   errors ([`retry`], [`Backoff`]).
//! - **Circuit breaking** with the classic closed, open and half-open states ([`breaker`]).
//! - **Deduplication** of identical requests: concurrent duplicates share one call, and completed
//!   replies may be reused for a few seconds ([`dedup`]).
//!
//! The actual HTTP call is delegated to a [`Transport`], so the crate works with any HTTP stack.
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use http::StatusCode;
//! use ripcord::{Client, ClientConfig, Error, FnTransport, Request, Response, TransportError};
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let transport = FnTransport::new(|request: Request| async move {
//!     match request.target() {
//!         "/healthy" => Ok::<_, TransportError>(Response::new(StatusCode::OK)),
//!         _ => Ok(Response::new(StatusCode::SERVICE_UNAVAILABLE)),
//!     }
//! });
//!
//! let client = Client::new(
//!     ClientConfig {
//!         max_retries: 2,
//!         initial_delay: Duration::from_millis(100),
//!         ..ClientConfig::default()
//!     },
//!     transport,
//! )
//! .expect("valid configuration");
//!
//! let reply = client.get("/healthy").await.expect("healthy endpoint");
//! assert_eq!(reply.status(), StatusCode::OK);
//!
//! let error = client.get("/broken").await.unwrap_err();
//! assert!(matches!(error, Error::RetriesExhausted { attempts: 3, .. }));
//! # }
//! ```
//!
//! # Failure Classification
//!
//! Every attempt ends in one of three ways, see [`retry::Classification`]:
//!
//! - a status below 400 is a success,
//! - a transport error or a 5xx status is a failure that counts against the circuit breaker and is
//!   retried when it is a transport error or one of the configured retryable statuses,
//! - a 4xx status is returned immediately and does not count against the circuit breaker.
//!
//! # Telemetry
//!
//! Retries, breaker transitions, rejections and deduplicated requests are logged as structured
//! [`tracing`] events named `ripcord.*`. With the `metrics` feature they also increment the
//! `resilience.event` OpenTelemetry counter, see `ClientBuilder::enable_metrics`. A hook registered
//! with [`ClientBuilder::on_event`] receives every [`ClientEvent`].
//!
//! # Features
//!
//! - `metrics`: OpenTelemetry metrics.
//! - `serde`: serialization of [`ClientConfig`].

mod backoff;
mod client;
mod config;
mod constants;
mod error;
mod fn_wrapper;
mod request;
mod response;
mod rnd;
mod transport;

pub mod breaker;
pub mod dedup;
pub mod retry;
pub mod telemetry;

pub use backoff::Backoff;
pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, ResultCaching};
pub use error::{ConfigError, Error, Failure};
pub use request::{Body, Request, RequestOptions};
pub use response::{Metadata, Reply, Response, Source};
pub use telemetry::ClientEvent;
pub use transport::{FnTransport, Transport, TransportError, TransportErrorKind};
