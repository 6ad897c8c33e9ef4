// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Calls a simulated backend that is flaky at first, then suffers an outage and finally recovers.
//!
//! Watch the console to see:
//!
//! 1. Transient `503`s retried with exponential backoff
//! 2. The circuit opening during the outage and failing requests fast
//! 3. Probe requests closing the circuit once the backend recovers
//! 4. Concurrent identical requests coalesced into a single call

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use http::StatusCode;
use ripcord::breaker::CircuitBreakerConfig;
use ripcord::{Client, ClientEvent, FnTransport, Request, Response, Transport, TransportError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let calls = Arc::new(AtomicU32::new(0));
    let transport = backend(Arc::clone(&calls));

    let client = Client::builder(transport)
        .name("flaky_backend")
        .max_retries(2)
        .backoff(Duration::from_millis(20), Duration::from_millis(200), 2.0)
        .circuit_breaker(CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 4,
            reset_timeout: Duration::from_millis(500),
            half_open_probe_limit: 2,
        })
        .on_event(|event: &ClientEvent| {
            if matches!(event, ClientEvent::CircuitOpened { .. } | ClientEvent::CircuitClosed { .. }) {
                println!("event: {}", event.name());
            }
        })
        .build()?;

    for index in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;

        match client.execute(Request::get(format!("/items/{index}"))).await {
            Ok(reply) => println!(
                "{index}: {} after {} attempt(s)",
                reply.status(),
                reply.metadata().attempts()
            ),
            Err(error) => println!("{index}: {error}"),
        }
    }

    let before = calls.load(Ordering::SeqCst);
    let replies = join_all((0..5).map(|_| client.get("/items/popular"))).await;
    let sources: Vec<_> = replies.iter().flatten().map(|reply| reply.metadata().source()).collect();
    println!(
        "5 concurrent requests, {} backend call(s), sources: {sources:?}",
        calls.load(Ordering::SeqCst) - before
    );

    println!("breaker: {:?}", client.breaker().stats());

    Ok(())
}

/// Flaky for the first 10 calls, down for the next 15, healthy afterwards.
fn backend(calls: Arc<AtomicU32>) -> impl Transport {
    FnTransport::new(move |_request: Request| {
        let call = calls.fetch_add(1, Ordering::SeqCst);

        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;

            let status = match call {
                0..10 if fastrand::u8(0..10) < 4 => StatusCode::SERVICE_UNAVAILABLE,
                10..25 => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::OK,
            };

            Ok::<_, TransportError>(Response::new(status))
        }
    })
}
