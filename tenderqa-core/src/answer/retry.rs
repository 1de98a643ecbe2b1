//! Retry scheduling for answer attempts.

use crate::config::RetryConfig;
use crate::provider::ProviderError;
use std::time::Duration;

/// How an answer attempt failed, which decides the wait before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request hit its deadline.
    Timeout,
    /// The request never produced a response (connection, protocol, API error).
    Transport,
    /// A response arrived but was unusable: error status, empty body, or
    /// output that does not satisfy the JSON contract.
    Soft,
}

impl FailureKind {
    pub fn classify(error: &ProviderError) -> Self {
        match error {
            ProviderError::Timeout => FailureKind::Timeout,
            ProviderError::Request(_) | ProviderError::Api(_) | ProviderError::Other(_) => FailureKind::Transport,
            ProviderError::Status { .. } | ProviderError::Json(_) => FailureKind::Soft,
        }
    }
}

/// Backoff between answer attempts.
///
/// Timeouts back off exponentially (`base * 2^attempt`, attempt counted
/// from 0), transport errors wait a fixed delay, soft failures retry at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub fixed: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, fixed: Duration) -> Self {
        Self { base, fixed }
    }

    /// A policy that never waits.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn delay(&self, attempt: u32, failure: FailureKind) -> Duration {
        match failure {
            FailureKind::Timeout => self.base.saturating_mul(1u32 << attempt.min(16)),
            FailureKind::Transport => self.fixed,
            FailureKind::Soft => Duration::ZERO,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.fixed_delay_ms),
        )
    }
}
