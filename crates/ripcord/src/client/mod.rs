// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod builder;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

pub use builder::ClientBuilder;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::time::Instant;

use crate::breaker::CircuitBreaker;
use crate::dedup::{DedupCache, Fingerprint, Lookup};
use crate::response::{Metadata, Source};
use crate::retry::{Classification, RetryPolicy};
use crate::telemetry::{ClientEvent, Telemetry};
use crate::{ClientConfig, ConfigError, Error, Failure, Reply, Request, ResultCaching, Transport, TransportError, TransportErrorKind};

type SharedOutcome = Shared<BoxFuture<'static, Result<Reply, Error>>>;

/// What the dedup cache holds for a fingerprint.
#[derive(Clone)]
enum Slot {
    InFlight(SharedOutcome),
    Completed(Reply),
}

impl Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InFlight(_) => f.write_str("InFlight"),
            Self::Completed(reply) => f.debug_tuple("Completed").field(reply).finish(),
        }
    }
}

impl Slot {
    async fn resolve(self) -> Result<Reply, Error> {
        match self {
            Self::InFlight(outcome) => outcome.await,
            Self::Completed(reply) => Ok(reply),
        }
    }
}

/// A resilient client around a [`Transport`].
///
/// Every request goes through three layers:
///
/// 1. **Deduplication.** Identical concurrent requests share one call. Completed replies may be
///    reused for a short time, see [`ResultCaching`].
/// 2. **Circuit breaking.** After repeated failures the client stops contacting the service for a
///    while and fails fast with [`Error::CircuitOpen`].
/// 3. **Retry.** Transport errors and selected server errors are retried with exponential backoff.
///
/// The client is a cheap handle: clones share the same breaker and deduplication state, while
/// separately built clients never share anything.
///
/// # Examples
///
/// ```
/// use http::StatusCode;
/// use ripcord::{Client, ClientConfig, FnTransport, Request, Response, TransportError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = FnTransport::new(|_request: Request| async {
///     Ok::<_, TransportError>(Response::new(StatusCode::OK).with_body("hello"))
/// });
///
/// let client = Client::new(ClientConfig::default(), transport)?;
/// let reply = client.execute(Request::get("https://api.example.com/greeting")).await?;
///
/// assert_eq!(reply.status(), StatusCode::OK);
/// assert_eq!(reply.metadata().attempts(), 1);
/// # Ok(())
/// # }
/// ```
pub struct Client<T> {
    inner: Arc<ClientInner<T>>,
}

struct ClientInner<T> {
    config: ClientConfig,
    transport: T,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    dedup: DedupCache<Slot>,
    telemetry: Telemetry,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.inner.telemetry.client_name())
            .field("breaker", &self.inner.breaker)
            .field("dedup", &self.inner.dedup)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Client<T> {
    /// Creates a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ClientConfig, transport: T) -> Result<Self, ConfigError> {
        Self::builder(transport).config(config).build()
    }

    /// Starts building a client with the default configuration.
    pub fn builder(transport: T) -> ClientBuilder<T> {
        ClientBuilder::new(transport)
    }

    /// Executes a logical request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CircuitOpen`] when the circuit breaker rejects an attempt,
    /// [`Error::RetriesExhausted`] when every attempt failed with a retryable failure, and
    /// [`Error::Terminal`] when an attempt failed with a failure that is not retried.
    pub async fn execute(&self, request: Request) -> Result<Reply, Error> {
        if !self.inner.deduplicates(&request) {
            return self.inner.run(request).await;
        }

        let fingerprint = Fingerprint::of(&request);
        let reuse_completed = self.inner.caches(&request);

        let lookup = self.inner.dedup.get_or_insert_with(
            fingerprint.clone(),
            |slot| match slot {
                Slot::InFlight(_) => true,
                Slot::Completed(_) => reuse_completed,
            },
            |id| Slot::InFlight(Arc::clone(&self.inner).spawn_shared(request, fingerprint.clone(), id)),
        );

        match lookup {
            Lookup::Inserted { value, .. } => value.resolve().await,
            Lookup::Existing(slot @ Slot::InFlight(_)) => {
                self.inner.telemetry.emit(&ClientEvent::Coalesced { fingerprint });
                slot.resolve().await.map(|reply| reply.with_source(Source::Coalesced))
            }
            Lookup::Existing(slot @ Slot::Completed(_)) => {
                self.inner.telemetry.emit(&ClientEvent::CacheHit { fingerprint });
                slot.resolve().await.map(|reply| reply.with_source(Source::Cached))
            }
        }
    }

    /// Shorthand for executing a `GET` request.
    ///
    /// # Errors
    ///
    /// See [`execute`][Self::execute].
    pub async fn get(&self, target: impl Into<String>) -> Result<Reply, Error> {
        self.execute(Request::get(target)).await
    }

    /// Returns the circuit breaker.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    /// Returns the configuration the client was built from.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the name reported in telemetry.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.telemetry.client_name()
    }

    /// Returns the number of deduplication entries, in flight or completed.
    #[must_use]
    pub fn dedup_entries(&self) -> usize {
        self.inner.dedup.purge_expired();
        self.inner.dedup.len()
    }
}

/// Removes the in-flight entry of a task that ends without storing a reply, including by panic.
struct RemoveOnDrop<'a> {
    dedup: &'a DedupCache<Slot>,
    fingerprint: &'a Fingerprint,
    id: u64,
    armed: bool,
}

impl Drop for RemoveOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.dedup.remove_if(self.fingerprint, self.id);
        }
    }
}

impl<T: Transport> ClientInner<T> {
    fn deduplicates(&self, request: &Request) -> bool {
        self.config.dedup_enabled && !request.options().bypasses_dedup()
    }

    fn caches(&self, request: &Request) -> bool {
        request
            .options()
            .cache_result()
            .unwrap_or_else(|| self.config.result_caching == ResultCaching::SafeMethods && request.method().is_safe())
    }

    /// Runs the request on its own task so that it completes even if the caller that started it
    /// goes away while others are waiting.
    fn spawn_shared(self: Arc<Self>, request: Request, fingerprint: Fingerprint, id: u64) -> SharedOutcome {
        let cache = self.caches(&request);

        let task = tokio::spawn(async move {
            let mut cleanup = RemoveOnDrop {
                dedup: &self.dedup,
                fingerprint: &fingerprint,
                id,
                armed: true,
            };

            let outcome = self.run(request).await;

            if let Ok(reply) = &outcome
                && cache
            {
                cleanup.armed = !cleanup.dedup.replace_if(cleanup.fingerprint, id, Slot::Completed(reply.clone()));
            }

            outcome
        });

        async move {
            task.await.unwrap_or_else(|join_error| {
                Err(Error::Terminal {
                    attempts: 0,
                    failure: Failure::Transport(
                        TransportError::new(TransportErrorKind::Aborted, "request task ended without an outcome").with_source(join_error),
                    ),
                })
            })
        }
        .boxed()
        .shared()
    }

    async fn run(&self, request: Request) -> Result<Reply, Error> {
        let started_at = Instant::now();
        let max_attempts = self.retry.max_attempts();
        let timeout = request.options().timeout().or(self.config.attempt_timeout);
        let mut attempt: u32 = 1;

        loop {
            let admission = match self.breaker.try_enter() {
                Ok(admission) => admission,
                Err(state) => {
                    return Err(Error::CircuitOpen {
                        attempts: attempt - 1,
                        state,
                    });
                }
            };

            let outcome = self.send(request.clone(), timeout).await;
            let classification = self.retry.classify(outcome);
            self.breaker.exit(admission, classification.execution_result());

            let failure = match classification {
                Classification::Success(response) => {
                    let metadata = Metadata {
                        attempts: attempt,
                        elapsed: started_at.elapsed(),
                        breaker_state: self.breaker.current_state(),
                        source: Source::Network,
                    };
                    return Ok(Reply::new(response, metadata));
                }
                Classification::Terminal(failure) => {
                    return Err(Error::Terminal { attempts: attempt, failure });
                }
                Classification::Retryable(failure) => failure,
            };

            if attempt >= max_attempts {
                self.telemetry.emit(&ClientEvent::RetriesExhausted {
                    attempts: attempt,
                    failure: failure.clone(),
                });
                return Err(Error::RetriesExhausted { attempts: attempt, last: failure });
            }

            let delay = self.retry.retry_delay(attempt, &failure);
            self.retry.notify_retry(attempt, delay, &failure);
            self.telemetry.emit(&ClientEvent::Retry { attempt, delay, failure });

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send(&self, request: Request, timeout: Option<Duration>) -> Result<crate::Response, TransportError> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.transport.send(request))
                .await
                .unwrap_or_else(|_elapsed| Err(TransportError::timeout(limit))),
            None => self.transport.send(request).await,
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use http::StatusCode;
    use tracing_test::traced_test;

    use super::*;
    use crate::{FnTransport, Response};

    fn fast_config() -> ClientConfig {
        ClientConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            jitter: false,
            ..ClientConfig::default()
        }
    }

    fn scripted(statuses: &'static [u16]) -> (Arc<AtomicU32>, impl Transport) {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let transport = FnTransport::new(move |_request: Request| {
            let index = calls_clone.fetch_add(1, Ordering::SeqCst) as usize;
            let status = statuses.get(index).or(statuses.last()).copied().unwrap_or(200);
            async move { Ok::<_, TransportError>(Response::new(StatusCode::from_u16(status).unwrap())) }
        });

        (calls, transport)
    }

    #[test]
    fn static_assertions() {
        static_assertions::assert_impl_all!(Client<FnTransport<fn(Request) -> std::future::Ready<Result<Response, TransportError>>>>: Send, Sync, Clone, Debug);
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt() {
        let (calls, transport) = scripted(&[200]);
        let client = Client::new(fast_config(), transport).unwrap();

        let reply = client.get("/a").await.unwrap();

        assert_eq!(reply.status(), StatusCode::OK);
        assert_eq!(reply.metadata().attempts(), 1);
        assert_eq!(reply.metadata().source(), Source::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.dedup_entries(), 0, "uncached entries are removed on completion");
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_exhausts() {
        let (calls, transport) = scripted(&[503]);
        let client = Client::new(
            ClientConfig {
                max_retries: 2,
                ..fast_config()
            },
            transport,
        )
        .unwrap();

        let error = client.get("/a").await.unwrap_err();

        assert!(matches!(error, Error::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(error.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_is_a_transport_failure() {
        let transport = FnTransport::new(|_request: Request| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, TransportError>(Response::new(StatusCode::OK))
        });
        let client = Client::new(
            ClientConfig {
                max_retries: 0,
                attempt_timeout: Some(Duration::from_secs(1)),
                ..fast_config()
            },
            transport,
        )
        .unwrap();

        let error = client.get("/slow").await.unwrap_err();

        let kind = error.failure().and_then(Failure::transport_error).map(TransportError::kind);
        assert_eq!(kind, Some(TransportErrorKind::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn request_timeout_overrides_config() {
        let transport = FnTransport::new(|_request: Request| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok::<_, TransportError>(Response::new(StatusCode::OK))
        });
        let client = Client::new(
            ClientConfig {
                attempt_timeout: Some(Duration::from_secs(1)),
                ..fast_config()
            },
            transport,
        )
        .unwrap();

        let reply = client.execute(Request::get("/slow").timeout(Duration::from_secs(3))).await.unwrap();

        assert_eq!(reply.metadata().attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bypass_skips_dedup() {
        let (calls, transport) = scripted(&[200]);
        let client = Client::new(fast_config(), transport).unwrap();

        let (a, b) = tokio::join!(
            client.execute(Request::get("/a").bypass_dedup()),
            client.execute(Request::get("/a").bypass_dedup())
        );

        assert_eq!(a.unwrap().metadata().source(), Source::Network);
        assert_eq!(b.unwrap().metadata().source(), Source::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn safe_methods_caching_policy() {
        let (calls, transport) = scripted(&[200]);
        let client = Client::new(
            ClientConfig {
                result_caching: ResultCaching::SafeMethods,
                ..fast_config()
            },
            transport,
        )
        .unwrap();

        client.get("/a").await.unwrap();
        let cached = client.get("/a").await.unwrap();
        client.execute(Request::post("/a")).await.unwrap();
        client.execute(Request::post("/a")).await.unwrap();

        assert_eq!(cached.metadata().source(), Source::Cached);
        assert_eq!(calls.load(Ordering::SeqCst), 3, "POST results are never replayed");
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_not_cached() {
        let (calls, transport) = scripted(&[404, 200]);
        let client = Client::new(fast_config(), transport).unwrap();

        let first = client.execute(Request::get("/a").cache_result(true)).await;
        let second = client.execute(Request::get("/a").cache_result(true)).await;

        assert!(matches!(first, Err(Error::Terminal { attempts: 1, .. })));
        assert_eq!(second.unwrap().metadata().source(), Source::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_replies_for_distinct_targets_are_swept() {
        let (calls, transport) = scripted(&[200]);
        let client = Client::new(
            ClientConfig {
                result_caching: ResultCaching::SafeMethods,
                dedup_ttl: Duration::from_secs(5),
                ..fast_config()
            },
            transport,
        )
        .unwrap();

        for index in 0..500 {
            client.get(format!("/users/{index}")).await.unwrap();
        }
        assert_eq!(client.inner.dedup.len(), 500);

        tokio::time::advance(Duration::from_secs(6)).await;
        client.get("/users/new").await.unwrap();

        assert_eq!(client.inner.dedup.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 501);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_transport_leaves_no_entry() {
        let transport = FnTransport::new(|request: Request| async move {
            assert_ne!(request.target(), "/a", "transport bug");
            Ok::<_, TransportError>(Response::new(StatusCode::OK))
        });
        let client = Client::new(
            ClientConfig {
                max_retries: 0,
                ..fast_config()
            },
            transport,
        )
        .unwrap();

        let error = client.get("/a").await.unwrap_err();

        let kind = error.failure().and_then(Failure::transport_error).map(TransportError::kind);
        assert_eq!(kind, Some(TransportErrorKind::Aborted));
        assert_eq!(client.inner.dedup.len(), 0);
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn retries_are_logged() {
        let (_calls, transport) = scripted(&[502, 200]);
        let client = Client::builder(transport).config(fast_config()).name("inventory").build().unwrap();

        client.execute(Request::get("/stock").bypass_dedup()).await.unwrap();

        assert!(logs_contain("ripcord.retry"));
        assert!(logs_contain("client.name=\"inventory\""));
        assert!(logs_contain("resilience.failure.status=502"));
    }
}
