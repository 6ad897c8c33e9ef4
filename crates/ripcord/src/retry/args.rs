// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::Failure;

/// Arguments for the [`on_retry`][super::RetryPolicy::on_retry] callback function.
///
/// Provides context for retry notifications.
#[derive(Debug)]
pub struct OnRetryArgs {
    pub(super) attempt: u32,
    pub(super) retry_delay: Duration,
    pub(super) failure: Failure,
}

impl OnRetryArgs {
    /// Returns the attempt that failed, starting at 1.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the delay before the next attempt.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Returns the failure that triggered this retry.
    #[must_use]
    pub fn failure(&self) -> &Failure {
        &self.failure
    }
}
