// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Resilience events and how they are reported.
//!
//! Every retry, breaker transition, rejection and deduplicated request is reported three ways:
//!
//! - as a structured [`tracing`] event named `ripcord.*`,
//! - as an increment of the `resilience.event` OpenTelemetry counter when the `metrics` feature is
//!   enabled and a meter provider was supplied,
//! - to the caller's hook registered with [`ClientBuilder::on_event`][crate::ClientBuilder::on_event].

mod attributes;
#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;

use std::borrow::Cow;
use std::time::Duration;

use crate::Failure;
use crate::breaker::CircuitState;
use crate::constants::DEFAULT_CLIENT_NAME;
use crate::dedup::Fingerprint;
use crate::fn_wrapper::define_fn_wrapper;

define_fn_wrapper!(OnEvent(Fn(event: &ClientEvent)));

/// A resilience event observed by a client.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ClientEvent {
    /// An attempt failed and another one is scheduled after `delay`.
    Retry {
        /// The attempt that failed, starting at 1.
        attempt: u32,
        /// Time to wait before the next attempt.
        delay: Duration,
        /// Why the attempt failed.
        failure: Failure,
    },

    /// The retry budget is spent.
    RetriesExhausted {
        /// Transport calls made.
        attempts: u32,
        /// Failure of the last attempt.
        failure: Failure,
    },

    /// The circuit opened.
    CircuitOpened {
        /// State before opening.
        from: CircuitState,
        /// Failures counted when the circuit opened.
        consecutive_failures: u32,
    },

    /// The reset timeout elapsed and the circuit started probing.
    CircuitHalfOpen,

    /// The circuit closed.
    CircuitClosed {
        /// State before closing.
        from: CircuitState,
    },

    /// A request was rejected without contacting the service.
    CircuitRejected {
        /// The state that caused the rejection.
        state: CircuitState,
    },

    /// A request joined an identical request already in flight.
    Coalesced {
        /// Identity of the shared request.
        fingerprint: Fingerprint,
    },

    /// A request was answered from a recently completed identical request.
    CacheHit {
        /// Identity of the cached request.
        fingerprint: Fingerprint,
    },
}

impl ClientEvent {
    /// Returns a short `snake_case` name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Retry { .. } => "retry",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::CircuitOpened { .. } => "circuit_opened",
            Self::CircuitHalfOpen => "circuit_half_open",
            Self::CircuitClosed { .. } => "circuit_closed",
            Self::CircuitRejected { .. } => "circuit_rejected",
            Self::Coalesced { .. } => "coalesced",
            Self::CacheHit { .. } => "cache_hit",
        }
    }

    #[cfg(any(feature = "metrics", test))]
    fn circuit_state(&self) -> Option<CircuitState> {
        match self {
            Self::CircuitOpened { .. } => Some(CircuitState::Open),
            Self::CircuitHalfOpen => Some(CircuitState::HalfOpen),
            Self::CircuitClosed { .. } => Some(CircuitState::Closed),
            Self::CircuitRejected { state } => Some(*state),
            _ => None,
        }
    }
}

/// Reports events for one client.
#[derive(Debug, Clone)]
pub(crate) struct Telemetry {
    client_name: Cow<'static, str>,
    on_event: Option<OnEvent>,
    #[cfg(any(feature = "metrics", test))]
    event_reporter: Option<opentelemetry::metrics::Counter<u64>>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(Cow::Borrowed(DEFAULT_CLIENT_NAME))
    }
}

impl Telemetry {
    pub fn new(client_name: Cow<'static, str>) -> Self {
        Self {
            client_name,
            on_event: None,
            #[cfg(any(feature = "metrics", test))]
            event_reporter: None,
        }
    }

    pub fn with_client_name(self, client_name: Cow<'static, str>) -> Self {
        Self { client_name, ..self }
    }

    pub fn with_on_event(self, on_event: Option<OnEvent>) -> Self {
        Self { on_event, ..self }
    }

    #[cfg(any(feature = "metrics", test))]
    pub fn with_meter_provider(self, meter_provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        let meter = metrics::create_meter(meter_provider);

        Self {
            event_reporter: Some(metrics::create_resilience_event_counter(&meter)),
            ..self
        }
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn emit(&self, event: &ClientEvent) {
        self.log(event);

        #[cfg(any(feature = "metrics", test))]
        self.report_metrics(event);

        if let Some(on_event) = &self.on_event {
            on_event.call(event);
        }
    }

    fn log(&self, event: &ClientEvent) {
        let client = self.client_name();

        match event {
            ClientEvent::Retry { attempt, delay, failure } => tracing::event!(
                name: "ripcord.retry",
                tracing::Level::WARN,
                client.name = client,
                resilience.attempt.index = attempt,
                resilience.retry.delay = delay.as_secs_f32(),
                resilience.failure.kind = failure.as_str(),
                resilience.failure.status = failure.status().map(|status| status.as_u16()),
                error = %failure,
            ),
            ClientEvent::RetriesExhausted { attempts, failure } => tracing::event!(
                name: "ripcord.retries_exhausted",
                tracing::Level::ERROR,
                client.name = client,
                resilience.attempts = attempts,
                resilience.failure.kind = failure.as_str(),
                error = %failure,
            ),
            ClientEvent::CircuitOpened {
                from,
                consecutive_failures,
            } => tracing::event!(
                name: "ripcord.circuit.opened",
                tracing::Level::WARN,
                client.name = client,
                circuit.state = CircuitState::Open.as_str(),
                circuit.previous_state = from.as_str(),
                circuit.consecutive_failures = consecutive_failures,
            ),
            ClientEvent::CircuitHalfOpen => tracing::event!(
                name: "ripcord.circuit.half_open",
                tracing::Level::INFO,
                client.name = client,
                circuit.state = CircuitState::HalfOpen.as_str(),
            ),
            ClientEvent::CircuitClosed { from } => tracing::event!(
                name: "ripcord.circuit.closed",
                tracing::Level::INFO,
                client.name = client,
                circuit.state = CircuitState::Closed.as_str(),
                circuit.previous_state = from.as_str(),
            ),
            ClientEvent::CircuitRejected { state } => tracing::event!(
                name: "ripcord.circuit.rejected",
                tracing::Level::DEBUG,
                client.name = client,
                circuit.state = state.as_str(),
            ),
            ClientEvent::Coalesced { fingerprint } => tracing::event!(
                name: "ripcord.dedup.coalesced",
                tracing::Level::DEBUG,
                client.name = client,
                dedup.fingerprint = fingerprint.as_str(),
            ),
            ClientEvent::CacheHit { fingerprint } => tracing::event!(
                name: "ripcord.dedup.cache_hit",
                tracing::Level::DEBUG,
                client.name = client,
                dedup.fingerprint = fingerprint.as_str(),
            ),
        }
    }

    #[cfg(any(feature = "metrics", test))]
    fn report_metrics(&self, event: &ClientEvent) {
        use attributes::{CIRCUIT_STATE, CLIENT_NAME, EVENT_NAME};
        use opentelemetry::KeyValue;

        let Some(reporter) = &self.event_reporter else {
            return;
        };

        let mut attributes = vec![
            KeyValue::new(CLIENT_NAME, self.client_name.clone()),
            KeyValue::new(EVENT_NAME, event.name()),
        ];

        if let Some(state) = event.circuit_state() {
            attributes.push(KeyValue::new(CIRCUIT_STATE, state.as_str()));
        }

        reporter.add(1, &attributes);
    }
}
