//! Fixed-interval retry policy for activation lifecycles
//!
//! The policy is stateless: the orchestrator owns the attempt counter for a
//! lifecycle and asks the policy after each failure whether another attempt
//! is allowed and how long to wait before it.

use std::time::Duration;

use crate::config::ActivationConfig;

/// Decision returned by [`RetryPolicy::should_retry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub delay: Duration,
}

/// Retry up to `max_retries` times with a fixed delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ActivationConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            interval,
        }
    }

    pub fn from_config(config: &ActivationConfig) -> Self {
        Self::new(config.max_retries, config.retry_interval())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide what to do after the `failed_attempts`-th failure of a lifecycle.
    ///
    /// Failures `1..=max_retries` are retried after the fixed interval; any
    /// later failure is terminal.
    pub fn should_retry(&self, failed_attempts: u32) -> RetryDecision {
        if failed_attempts >= 1 && failed_attempts <= self.max_retries {
            RetryDecision {
                retry: true,
                delay: self.interval,
            }
        } else {
            RetryDecision {
                retry: false,
                delay: Duration::ZERO,
            }
        }
    }
}
