// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Three-state circuit breaker.
//!
//! The breaker starts [`Closed`][CircuitState::Closed] and counts consecutive failures. Reaching
//! the threshold opens it: every request is rejected until the reset timeout has elapsed since the
//! last failure. The first request after that moves the breaker to
//! [`HalfOpen`][CircuitState::HalfOpen] and is admitted as a probe; a limited number of further
//! probes may follow. A single failed probe opens the breaker again, while as many successful probes
//! as the probe limit close it.
//!
//! A probe slot whose outcome is never reported, because the call was dropped or panicked, is
//! handed to a new probe once the reset timeout has passed since the most recent probe, so a
//! half-open breaker cannot get stuck.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use ripcord::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
//!
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig {
//!     failure_threshold: 2,
//!     reset_timeout: Duration::from_secs(30),
//!     ..CircuitBreakerConfig::default()
//! });
//!
//! breaker.record_failure();
//! breaker.record_failure();
//!
//! assert_eq!(breaker.current_state(), CircuitState::Open);
//! assert!(!breaker.should_allow());
//! ```

mod config;
mod engine;

use std::fmt::Display;

pub use config::CircuitBreakerConfig;
use engine::{Engine, EnterResult};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::fn_wrapper::define_fn_wrapper;
use crate::telemetry::{ClientEvent, Telemetry};

define_fn_wrapper!(OnTransition(Fn(transition: &Transition)));

/// The state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected without contacting the service.
    Open,
    /// A limited number of probe requests test whether the service recovered.
    HalfOpen,
}

impl CircuitState {
    /// Returns a short `snake_case` label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an admitted call as seen by the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The service is healthy.
    Success,
    /// The service failed.
    Failure,
}

impl ExecutionResult {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AdmissionKind {
    Normal,
    Probe,
    Bypassed,
}

/// Proof that a call was admitted by [`CircuitBreaker::enter`].
///
/// The admission remembers the phase of the breaker it was granted in. Results reported with an
/// admission from an earlier phase are ignored, so a slow call started while closed cannot reopen
/// a breaker that has since moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub(crate) kind: AdmissionKind,
    pub(crate) epoch: u64,
}

impl Admission {
    /// Returns `true` when the call was admitted as a half-open probe.
    #[must_use]
    pub fn is_probe(&self) -> bool {
        self.kind == AdmissionKind::Probe
    }
}

/// A change of circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the change.
    pub from: CircuitState,
    /// State after the change.
    pub to: CircuitState,
}

/// Point-in-time counters of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct BreakerStats {
    /// Current state.
    pub state: CircuitState,
    /// Failures since the last success or close.
    pub consecutive_failures: u32,
    /// Probes admitted in the current half-open phase.
    pub probes_issued: u32,
    /// Successful probes in the current half-open phase.
    pub probe_successes: u32,
    /// How many times the circuit has opened.
    pub times_opened: u64,
    /// Requests rejected while open or out of probes.
    pub rejected: u64,
}

/// A thread-safe circuit breaker.
///
/// Each state check and transition happens in a single critical section, so when the reset timeout
/// elapses exactly one of many concurrent callers moves the breaker to half-open. Telemetry and
/// callbacks run after the lock is released.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    engine: Mutex<Engine>,
    telemetry: Telemetry,
    on_transition: Option<OnTransition>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_telemetry(config, Telemetry::default())
    }

    pub(crate) fn with_telemetry(config: CircuitBreakerConfig, telemetry: Telemetry) -> Self {
        Self {
            config,
            engine: Mutex::new(Engine::new()),
            telemetry,
            on_transition: None,
        }
    }

    /// Invokes `callback` after every state change.
    #[must_use]
    pub fn on_transition(self, callback: impl Fn(&Transition) + Send + Sync + 'static) -> Self {
        self.with_on_transition(Some(OnTransition::new(callback)))
    }

    pub(crate) fn with_on_transition(self, on_transition: Option<OnTransition>) -> Self {
        Self { on_transition, ..self }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Asks whether a request may proceed, moving an expired open circuit to half-open.
    ///
    /// An admitted half-open call occupies one probe slot; report its outcome with
    /// [`record_success`][Self::record_success] or [`record_failure`][Self::record_failure].
    pub fn should_allow(&self) -> bool {
        self.enter().is_some()
    }

    /// Admits a call, returning `None` when the circuit rejects it.
    pub fn enter(&self) -> Option<Admission> {
        self.try_enter().ok()
    }

    /// Admits a call, or returns the state that rejected it.
    pub(crate) fn try_enter(&self) -> Result<Admission, CircuitState> {
        if !self.config.enabled {
            return Ok(Admission {
                kind: AdmissionKind::Bypassed,
                epoch: 0,
            });
        }

        let now = Instant::now();

        // NOTE: Keep telemetry and callbacks outside of the lock.
        let result = self.engine.lock().enter(now, &self.config);

        match result {
            EnterResult::Admitted { admission, transition } => {
                if let Some(transition) = transition {
                    self.notify(transition);
                }
                Ok(admission)
            }
            EnterResult::Rejected { state } => {
                self.telemetry.emit(&ClientEvent::CircuitRejected { state });
                Err(state)
            }
        }
    }

    /// Reports the outcome of a call admitted by [`enter`][Self::enter].
    pub fn exit(&self, admission: Admission, result: ExecutionResult) {
        if !self.config.enabled {
            return;
        }

        let now = Instant::now();

        if admission.is_probe() {
            tracing::event!(
                name: "ripcord.circuit.probe",
                tracing::Level::DEBUG,
                client.name = self.telemetry.client_name(),
                circuit.probe.result = result.as_str(),
            );
        }

        let transition = self.engine.lock().exit(result, admission, now, &self.config);

        if let Some(transition) = transition {
            self.notify(transition);
        }
    }

    /// Records a success in the current phase.
    pub fn record_success(&self) {
        self.record(ExecutionResult::Success);
    }

    /// Records a failure in the current phase.
    ///
    /// Failures reported while the circuit is open are ignored.
    pub fn record_failure(&self) {
        self.record(ExecutionResult::Failure);
    }

    /// Returns the current state. A disabled breaker is always closed.
    #[must_use]
    pub fn current_state(&self) -> CircuitState {
        if !self.config.enabled {
            return CircuitState::Closed;
        }

        self.engine.lock().state()
    }

    /// Forces the breaker closed and clears its counters.
    pub fn reset(&self) {
        let transition = self.engine.lock().reset();

        if let Some(transition) = transition {
            self.notify(transition);
        }
    }

    /// Returns a snapshot of the breaker counters.
    #[must_use]
    pub fn stats(&self) -> BreakerStats {
        self.engine.lock().stats()
    }

    fn record(&self, result: ExecutionResult) {
        if !self.config.enabled {
            return;
        }

        let admission = self.engine.lock().current_admission();
        self.exit(admission, result);
    }

    fn notify(&self, transition: Transition) {
        let event = match transition.to {
            CircuitState::Open => ClientEvent::CircuitOpened {
                from: transition.from,
                consecutive_failures: self.engine.lock().stats().consecutive_failures,
            },
            CircuitState::HalfOpen => ClientEvent::CircuitHalfOpen,
            CircuitState::Closed => ClientEvent::CircuitClosed { from: transition.from },
        };

        self.telemetry.emit(&event);

        if let Some(callback) = &self.on_transition {
            callback.call(&transition);
        }
    }
}
