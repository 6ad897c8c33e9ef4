// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Exponential backoff with bounded jitter.

use std::cmp::min;
use std::time::Duration;

use crate::rnd::Rnd;

/// Upper bound of the jitter, relative to the computed delay.
const JITTER_FACTOR: f64 = 0.1;

/// Computes the delay before a retry attempt.
///
/// The delay for attempt `n` (1-based) is
/// `min(initial_delay * multiplier^(n - 1), max_delay)`. When jitter is enabled, a uniform random
/// component in `[0, 0.1 * delay]` is added and the result is clamped to `max_delay` again, so the
/// returned value never exceeds the cap.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ripcord::Backoff;
///
/// let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 2.0).jitter(false);
///
/// assert_eq!(backoff.delay(1), Duration::from_millis(100));
/// assert_eq!(backoff.delay(2), Duration::from_millis(200));
/// assert_eq!(backoff.delay(5), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    use_jitter: bool,
    rnd: Rnd,
}

impl Backoff {
    /// Creates a jittered exponential backoff.
    #[must_use]
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            use_jitter: true,
            rnd: Rnd::default(),
        }
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn jitter(self, enabled: bool) -> Self {
        Self {
            use_jitter: enabled,
            ..self
        }
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Returns the upper bound of any delay.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    #[cfg(test)]
    pub(crate) fn with_rnd(self, rnd: Rnd) -> Self {
        Self { rnd, ..self }
    }

    /// Returns the delay to wait before retry `attempt`.
    ///
    /// Attempts are 1-based; `0` is treated as `1`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);

        if !self.use_jitter {
            return base;
        }

        let jitter = base.as_secs_f64() * JITTER_FACTOR * self.rnd.next_f64();
        min(base.saturating_add(secs_to_duration_saturating(jitter)), self.max_delay)
    }

    /// Returns the delay sequence for attempts `1, 2, 3, ...`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=u32::MAX).map(|attempt| self.delay(attempt))
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.powi(exponent);
        let secs = self.initial_delay.as_secs_f64() * factor;

        if !secs.is_finite() {
            return self.max_delay;
        }

        min(secs_to_duration_saturating(secs), self.max_delay)
    }
}

fn secs_to_duration_saturating(secs: f64) -> Duration {
    if secs <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
