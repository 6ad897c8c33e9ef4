// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(all(feature = "metrics", not(miri)))]

//! Integration tests for the `resilience.event` counter.

use std::time::Duration;

use http::StatusCode;
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};
use ripcord::{Client, ClientConfig, FnTransport, Request, Response, TransportError};

#[tokio::test(start_paused = true)]
async fn retries_are_counted() {
    let exporter = InMemoryMetricExporter::default();
    let provider = SdkMeterProvider::builder().with_periodic_exporter(exporter.clone()).build();
    let transport = FnTransport::new(|_request: Request| async {
        Ok::<_, TransportError>(Response::new(StatusCode::BAD_GATEWAY))
    });

    let client = Client::builder(transport)
        .config(ClientConfig {
            max_retries: 1,
            initial_delay: Duration::from_millis(10),
            jitter: false,
            ..ClientConfig::default()
        })
        .name("payments")
        .enable_metrics(&provider)
        .build()
        .unwrap();

    client.get("/charge").await.unwrap_err();
    provider.force_flush().unwrap();

    let metrics = format!("{:?}", exporter.get_finished_metrics().unwrap());
    assert!(metrics.contains("resilience.event"));
    assert!(metrics.contains("payments"));
    assert!(metrics.contains("retry"));
    assert!(metrics.contains("retries_exhausted"));
}
