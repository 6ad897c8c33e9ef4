// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use tokio::time::Instant;

use super::{Admission, AdmissionKind, BreakerStats, CircuitBreakerConfig, CircuitState, ExecutionResult, Transition};

/// Result of asking the engine to admit a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnterResult {
    Admitted {
        admission: Admission,
        transition: Option<Transition>,
    },
    Rejected {
        state: CircuitState,
    },
}

/// Lock-free core of the circuit breaker. The caller serializes access and supplies the time.
#[derive(Debug)]
pub(crate) struct Engine {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    probes_issued: u32,
    probe_successes: u32,
    slot_issued_at: Option<Instant>,
    // Bumped on every transition; results carrying an older epoch are ignored.
    epoch: u64,
    times_opened: u64,
    rejected: u64,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            probes_issued: 0,
            probe_successes: 0,
            slot_issued_at: None,
            epoch: 0,
            times_opened: 0,
            rejected: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn enter(&mut self, now: Instant, config: &CircuitBreakerConfig) -> EnterResult {
        match self.state {
            CircuitState::Closed => EnterResult::Admitted {
                admission: self.admission(AdmissionKind::Normal),
                transition: None,
            },
            CircuitState::Open => {
                let elapsed = self
                    .last_failure
                    .is_none_or(|failed_at| now.saturating_duration_since(failed_at) >= config.reset_timeout);

                if !elapsed {
                    return self.reject();
                }

                let transition = self.transition_to(CircuitState::HalfOpen);
                self.probes_issued = 1;
                self.slot_issued_at = Some(now);

                EnterResult::Admitted {
                    admission: self.admission(AdmissionKind::Probe),
                    transition: Some(transition),
                }
            }
            CircuitState::HalfOpen => {
                if self.probes_issued >= config.half_open_probe_limit {
                    // A slot whose result never arrives (dropped future, panicked task) is held
                    // only until a reset timeout passes without a newer admission.
                    let stalled = self
                        .slot_issued_at
                        .is_none_or(|issued_at| now.saturating_duration_since(issued_at) > config.reset_timeout);

                    if !stalled {
                        return self.reject();
                    }
                } else {
                    self.probes_issued = self.probes_issued.saturating_add(1);
                }

                self.slot_issued_at = Some(now);

                EnterResult::Admitted {
                    admission: self.admission(AdmissionKind::Probe),
                    transition: None,
                }
            }
        }
    }

    pub fn exit(&mut self, result: ExecutionResult, admission: Admission, now: Instant, config: &CircuitBreakerConfig) -> Option<Transition> {
        if admission.kind == AdmissionKind::Bypassed || admission.epoch != self.epoch {
            return None;
        }

        match (self.state, result) {
            (CircuitState::Closed, ExecutionResult::Success) => {
                self.consecutive_failures = 0;
                None
            }
            (CircuitState::Closed, ExecutionResult::Failure) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_failure = Some(now);

                (self.consecutive_failures >= config.failure_threshold).then(|| self.transition_to(CircuitState::Open))
            }
            (CircuitState::HalfOpen, ExecutionResult::Success) => {
                self.probe_successes = self.probe_successes.saturating_add(1);

                (self.probe_successes >= config.half_open_probe_limit).then(|| self.transition_to(CircuitState::Closed))
            }
            (CircuitState::HalfOpen, ExecutionResult::Failure) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_failure = Some(now);

                Some(self.transition_to(CircuitState::Open))
            }
            // Nothing is admitted in the current open epoch.
            (CircuitState::Open, _) => None,
        }
    }

    /// Returns an admission matching the current phase, for outcomes reported without one.
    pub fn current_admission(&self) -> Admission {
        match self.state {
            CircuitState::Closed => self.admission(AdmissionKind::Normal),
            CircuitState::HalfOpen => self.admission(AdmissionKind::Probe),
            CircuitState::Open => self.admission(AdmissionKind::Bypassed),
        }
    }

    pub fn reset(&mut self) -> Option<Transition> {
        let transition = (self.state != CircuitState::Closed).then(|| self.transition_to(CircuitState::Closed));

        if transition.is_none() {
            self.consecutive_failures = 0;
        }
        self.last_failure = None;

        transition
    }

    pub fn stats(&self) -> BreakerStats {
        BreakerStats {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            probes_issued: self.probes_issued,
            probe_successes: self.probe_successes,
            times_opened: self.times_opened,
            rejected: self.rejected,
        }
    }

    fn admission(&self, kind: AdmissionKind) -> Admission {
        Admission { kind, epoch: self.epoch }
    }

    fn reject(&mut self) -> EnterResult {
        self.rejected = self.rejected.saturating_add(1);
        EnterResult::Rejected { state: self.state }
    }

    fn transition_to(&mut self, to: CircuitState) -> Transition {
        let from = self.state;

        self.state = to;
        self.epoch = self.epoch.wrapping_add(1);
        self.probes_issued = 0;
        self.probe_successes = 0;
        self.slot_issued_at = None;

        match to {
            CircuitState::Closed => self.consecutive_failures = 0,
            CircuitState::Open => self.times_opened = self.times_opened.saturating_add(1),
            CircuitState::HalfOpen => {}
        }

        Transition { from, to }
    }
}
