//! Retry eligibility and exponential backoff
//!
//! The policy is a pure function of the error and the number of retries
//! already performed for the request, so the pipeline can consult it without
//! keeping any state of its own.

use std::time::Duration;

use crate::error::ApiError;

/// Outcome of consulting the retry policy for one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Whether the request should be sent again
    pub should_retry: bool,
    /// How long to wait before sending it again
    pub delay: Duration,
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries per request
    pub max_retries: u32,
    /// Delay unit; the wait before retry `n` is `base_delay * 2^n`
    pub base_delay: Duration,
    /// Ceiling for any single wait
    pub max_delay: Duration,
    /// Whether a 401 counts as transient
    pub retry_unauthorized: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            retry_unauthorized: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given retry limit
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries, ..Default::default() }
    }

    /// Set the delay unit
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set whether 401 responses are retried
    pub fn with_retry_unauthorized(mut self, enabled: bool) -> Self {
        self.retry_unauthorized = enabled;
        self
    }

    /// Whether a request that already used `attempt` retries may try again
    pub fn should_retry(&self, error: &ApiError, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }

        match error {
            ApiError::Network(_) | ApiError::Timeout(_) => true,
            ApiError::Status { status, .. } => match *status {
                422 | 403 => false,
                401 => self.retry_unauthorized,
                500..=599 => true,
                _ => false,
            },
            _ => false,
        }
    }

    /// Wait before retry number `attempt`, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Consult the policy for a failure
    ///
    /// The delay is computed from the counter as it will be after the retry
    /// is recorded, so the first retry waits `2 * base_delay`.
    pub fn decide(&self, error: &ApiError, attempt: u32) -> RetryDecision {
        RetryDecision {
            should_retry: self.should_retry(error, attempt),
            delay: self.delay_for(attempt.saturating_add(1)),
        }
    }
}
