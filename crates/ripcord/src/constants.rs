// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Default number of retries after the first attempt.
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before the first retry.
pub(crate) const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for any single backoff delay.
pub(crate) const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Growth factor applied to the delay between consecutive retries.
pub(crate) const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Jitter is on unless a caller needs exact delays.
pub(crate) const DEFAULT_USE_JITTER: bool = true;

/// Upstream statuses that are retried when no predicate overrides the classification.
pub(crate) const DEFAULT_RETRYABLE_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Consecutive failures that trip a closed circuit.
pub(crate) const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// How long an open circuit rejects requests before probing.
pub(crate) const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

/// Trial requests admitted while half-open; the same number of successes closes the circuit.
pub(crate) const DEFAULT_HALF_OPEN_PROBE_LIMIT: u32 = 3;

/// Lifetime of a deduplication entry, in flight or completed.
pub(crate) const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(5);

pub(crate) const DEFAULT_CLIENT_NAME: &str = "default";
