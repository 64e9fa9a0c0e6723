//! Retry policy for page fetches.
//!
//! The policy is plain data plus pure decisions: it says how many attempts a
//! (source, keyword, page) unit gets, how long to wait between them, and which
//! outcomes are worth another try. The orchestrator drives the loop and keeps
//! the [`FetchAttempt`] history only while the loop runs.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, FetchErrorKind};

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// `base_delay * attempt`
    Linear,
    /// `base_delay * 2^(attempt - 1)`
    #[default]
    Exponential,
}

/// Attempt budget and delay schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per unit, including the first.
    pub max_attempts: u32,

    /// Wait after the first failed attempt.
    pub base_delay: Duration,

    pub backoff: Backoff,

    /// Upper bound on any single wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff: Backoff::Exponential,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// A single attempt and no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff: Backoff::Linear,
            max_delay: Duration::ZERO,
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                reason: "retry max_attempts must be at least 1".to_string(),
            });
        }
        if self.max_delay < self.base_delay {
            return Err(ConfigError::Invalid {
                reason: "retry max_delay must not be below base_delay".to_string(),
            });
        }
        Ok(())
    }

    /// Wait after the given failed attempt (1-based). Never decreases as
    /// `attempt` grows and never exceeds `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let raw = match self.backoff {
            Backoff::Linear => self.base_delay.checked_mul(attempt),
            Backoff::Exponential => 2u32
                .checked_pow(attempt - 1)
                .and_then(|factor| self.base_delay.checked_mul(factor)),
        };

        raw.unwrap_or(self.max_delay).min(self.max_delay)
    }

    /// Whether an error of this kind earns another attempt.
    pub fn is_retryable(&self, kind: FetchErrorKind) -> bool {
        kind.should_retry()
    }

    /// What to do after an attempt.
    pub fn decide(&self, attempt: &FetchAttempt) -> RetryDecision {
        match attempt.outcome {
            AttemptOutcome::Success => RetryDecision::Done,
            AttemptOutcome::FatalError => RetryDecision::Abort,
            AttemptOutcome::ChallengeTimeout | AttemptOutcome::TransientError => {
                if attempt.number >= self.max_attempts {
                    RetryDecision::Exhausted
                } else {
                    RetryDecision::RetryAfter(self.delay_for(attempt.number))
                }
            }
        }
    }
}

/// What one attempt came to, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    ChallengeTimeout,
    TransientError,
    FatalError,
}

impl AttemptOutcome {
    /// Classify an error kind. Kinds handled outside the retry loop (parse,
    /// unknown, cancelled) have no attempt outcome.
    pub fn from_kind(kind: FetchErrorKind) -> Option<Self> {
        match kind {
            FetchErrorKind::Network => Some(AttemptOutcome::TransientError),
            FetchErrorKind::ChallengeTimeout => Some(AttemptOutcome::ChallengeTimeout),
            FetchErrorKind::Fatal => Some(AttemptOutcome::FatalError),
            FetchErrorKind::Parse | FetchErrorKind::Unknown | FetchErrorKind::Cancelled => None,
        }
    }
}

/// One attempt at a fetch unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchAttempt {
    /// 1-based
    pub number: u32,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
}

impl FetchAttempt {
    pub fn new(number: u32, outcome: AttemptOutcome, elapsed: Duration) -> Self {
        Self {
            number,
            outcome,
            elapsed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The attempt succeeded.
    Done,
    /// Wait, then try again.
    RetryAfter(Duration),
    /// Retryable failure but the budget is spent.
    Exhausted,
    /// Fatal failure; stop without further attempts.
    Abort,
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancellation.
pub async fn backoff_sleep(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }

    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn attempt(number: u32, outcome: AttemptOutcome) -> FetchAttempt {
        FetchAttempt::new(number, outcome, Duration::from_millis(10))
    }

    #[test]
    fn test_exponential_schedule() {
        let policy = RetryPolicy::new(5)
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5));

        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(60), Duration::from_secs(5));
    }

    #[test]
    fn test_linear_schedule() {
        let policy = RetryPolicy::new(4)
            .with_backoff(Backoff::Linear)
            .with_base_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(10));

        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1500));
    }

    #[test]
    fn test_decisions() {
        let policy = RetryPolicy::new(3);

        assert_eq!(policy.decide(&attempt(1, AttemptOutcome::Success)), RetryDecision::Done);
        assert_eq!(
            policy.decide(&attempt(1, AttemptOutcome::FatalError)),
            RetryDecision::Abort
        );
        assert_eq!(
            policy.decide(&attempt(1, AttemptOutcome::TransientError)),
            RetryDecision::RetryAfter(policy.delay_for(1))
        );
        assert_eq!(
            policy.decide(&attempt(2, AttemptOutcome::ChallengeTimeout)),
            RetryDecision::RetryAfter(policy.delay_for(2))
        );
        assert_eq!(
            policy.decide(&attempt(3, AttemptOutcome::TransientError)),
            RetryDecision::Exhausted
        );
    }

    #[test]
    fn test_single_attempt_policy() {
        let policy = RetryPolicy::no_retry();
        assert!(policy.validate().is_ok());
        assert_eq!(
            policy.decide(&attempt(1, AttemptOutcome::TransientError)),
            RetryDecision::Exhausted
        );
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(
            AttemptOutcome::from_kind(FetchErrorKind::Network),
            Some(AttemptOutcome::TransientError)
        );
        assert_eq!(
            AttemptOutcome::from_kind(FetchErrorKind::Fatal),
            Some(AttemptOutcome::FatalError)
        );
        assert_eq!(AttemptOutcome::from_kind(FetchErrorKind::Parse), None);
        assert_eq!(AttemptOutcome::from_kind(FetchErrorKind::Cancelled), None);
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::new(0).validate().is_err());

        let inverted = RetryPolicy::default()
            .with_base_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(1));
        assert!(inverted.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleep_cancellable() {
        let cancel = CancellationToken::new();
        assert!(backoff_sleep(Duration::from_secs(1), &cancel).await);

        cancel.cancel();
        let started = tokio::time::Instant::now();
        assert!(!backoff_sleep(Duration::from_secs(3600), &cancel).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    proptest! {
        #[test]
        fn delays_never_decrease_and_stay_bounded(
            base_ms in 0u64..5_000,
            cap_extra_ms in 0u64..60_000,
            exponential in any::<bool>(),
            attempt in 1u32..64,
        ) {
            let policy = RetryPolicy::new(attempt + 1)
                .with_backoff(if exponential { Backoff::Exponential } else { Backoff::Linear })
                .with_base_delay(Duration::from_millis(base_ms))
                .with_max_delay(Duration::from_millis(base_ms + cap_extra_ms));

            let current = policy.delay_for(attempt);
            let next = policy.delay_for(attempt + 1);
            prop_assert!(next >= current);
            prop_assert!(next <= policy.max_delay);
        }
    }
}
