//! Retry schedule and outcome reporting for token updates.

use std::time::Duration;

use crate::constants::{TOKEN_UPDATE_BACKOFF_STEP, TOKEN_UPDATE_MAX_ATTEMPTS};
use crate::error::PushError;

/// Linear retry policy.
///
/// The wait after failed attempt `n` (1-based) is `n * step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    step: Duration,
}

impl RetryPolicy {
    /// Policy with `max_attempts` total attempts and a linear `step`.
    ///
    /// At least one attempt is always made.
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            step,
        }
    }

    /// Total attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before the attempt following failed attempt `attempt`.
    ///
    /// `None` when `attempt` was the last one allowed.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        (attempt >= 1 && attempt < self.max_attempts).then(|| self.step * attempt)
    }

    /// Every wait a fully failing sequence goes through.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .filter_map(|attempt| self.delay_after(attempt))
            .collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(TOKEN_UPDATE_MAX_ATTEMPTS, TOKEN_UPDATE_BACKOFF_STEP)
    }
}

/// Terminal state of a token update sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// An attempt was acknowledged by the server.
    Succeeded,
    /// Attempts exhausted, or a non-retryable failure.
    Failed,
    /// Aborted through the cancellation token.
    Cancelled,
}

/// What a token update sequence did.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenUpdateReport {
    /// How the sequence ended.
    pub status: UpdateStatus,
    /// Attempts started.
    pub attempts: u32,
    /// Backoff delays fully waited, in order.
    pub waits: Vec<Duration>,
    /// Failure of the last attempt, if it failed.
    pub last_error: Option<PushError>,
}

impl TokenUpdateReport {
    pub(crate) fn new() -> Self {
        Self {
            status: UpdateStatus::Failed,
            attempts: 0,
            waits: Vec::new(),
            last_error: None,
        }
    }

    /// Returns `true` if the server acknowledged the token.
    pub fn succeeded(&self) -> bool {
        self.status == UpdateStatus::Succeeded
    }

    /// Total time spent in backoff.
    pub fn total_wait(&self) -> Duration {
        self.waits.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(
            policy.schedule(),
            vec![Duration::from_millis(3000), Duration::from_millis(6000)]
        );
    }

    #[test]
    fn test_no_delay_after_last_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(3000)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(6000)));
        assert_eq!(policy.delay_after(3), None);
        assert_eq!(policy.delay_after(0), None);
    }

    #[test]
    fn test_single_attempt_policy() {
        let policy = RetryPolicy::linear(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 1);
        assert!(policy.schedule().is_empty());
    }

    #[test]
    fn test_report_total_wait() {
        let mut report = TokenUpdateReport::new();
        assert!(!report.succeeded());
        report.waits = RetryPolicy::default().schedule();
        assert_eq!(report.total_wait(), Duration::from_millis(9000));
    }
}
