// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Attribute keys attached to emitted metrics.
//!
//! Names follow the OpenTelemetry naming guidelines: dot-separated keys with short `snake_case`
//! values.

/// Key used to annotate the name of the client that emitted the event.
///
/// Examples: `default`, `billing_api`, `user_profiles`.
#[cfg(any(feature = "metrics", test))]
pub(crate) const CLIENT_NAME: &str = "resilience.client.name";

/// Key used to annotate the specific resilience event being emitted.
///
/// Examples: `retry`, `circuit_opened`, `coalesced`.
#[cfg(any(feature = "metrics", test))]
pub(crate) const EVENT_NAME: &str = "resilience.event.name";

/// Key used to annotate the circuit state associated with a breaker event.
#[cfg(any(feature = "metrics", test))]
pub(crate) const CIRCUIT_STATE: &str = "resilience.circuit.state";

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_keys_are_stable() {
        assert_eq!(CLIENT_NAME, "resilience.client.name");
        assert_eq!(EVENT_NAME, "resilience.event.name");
        assert_eq!(CIRCUIT_STATE, "resilience.circuit.state");
    }
}
