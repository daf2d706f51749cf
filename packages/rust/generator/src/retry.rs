//! Retry schedule and the clock it sleeps on.

use std::time::Duration;

use async_trait::async_trait;

use studyqa_shared::RetryConfig;

use crate::error::GenerationError;

/// Backoff policy for one generation request.
///
/// Transient failures back off from `base_delay`, rate limits from
/// `rate_limit_delay`; both double per retry and are capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub rate_limit_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            rate_limit_delay: Duration::from_millis(config.rate_limit_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after attempt number `attempt`
    /// (1-based) failed with `error`, or `None` to give up.
    pub fn backoff(&self, attempt: u32, error: &GenerationError) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));

        let delay = match error {
            GenerationError::Transient { .. } => self.base_delay.saturating_mul(factor),
            GenerationError::RateLimited { retry_after } => {
                let scheduled = self.rate_limit_delay.saturating_mul(factor);
                match retry_after {
                    Some(hint) => scheduled.max(*hint),
                    None => scheduled,
                }
            }
            _ => return None,
        };

        Some(delay.min(self.max_delay))
    }
}

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// Source of backoff delays. Swapped for a recording fake in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> GenerationError {
        GenerationError::Transient {
            message: "HTTP 503".into(),
        }
    }

    #[test]
    fn transient_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1, &transient()), Some(Duration::from_secs(2)));
        assert_eq!(policy.backoff(2, &transient()), Some(Duration::from_secs(4)));
        assert_eq!(policy.backoff(3, &transient()), None);
    }

    #[test]
    fn rate_limit_starts_at_thirty_seconds() {
        let policy = RetryPolicy::default();
        let err = GenerationError::RateLimited { retry_after: None };
        assert_eq!(policy.backoff(1, &err), Some(Duration::from_secs(30)));
        assert_eq!(policy.backoff(2, &err), Some(Duration::from_secs(60)));
    }

    #[test]
    fn retry_after_hint_wins_when_longer() {
        let policy = RetryPolicy::default();
        let err = GenerationError::RateLimited {
            retry_after: Some(Duration::from_secs(45)),
        };
        assert_eq!(policy.backoff(1, &err), Some(Duration::from_secs(45)));

        let short = GenerationError::RateLimited {
            retry_after: Some(Duration::from_secs(1)),
        };
        assert_eq!(policy.backoff(1, &short), Some(Duration::from_secs(30)));
    }

    #[test]
    fn delays_are_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            max_delay: Duration::from_secs(50),
            ..RetryPolicy::default()
        };
        let err = GenerationError::RateLimited { retry_after: None };
        assert_eq!(policy.backoff(3, &err), Some(Duration::from_secs(50)));
    }

    #[test]
    fn terminal_errors_never_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1, &GenerationError::Unauthorized), None);
        assert_eq!(policy.backoff(1, &GenerationError::Forbidden), None);
        assert_eq!(
            policy.backoff(
                1,
                &GenerationError::Rejected {
                    status: 400,
                    message: "bad".into()
                }
            ),
            None
        );
    }

    #[test]
    fn zero_attempts_in_config_still_tries_once() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(RetryPolicy::from(&config).max_attempts, 1);
    }
}
