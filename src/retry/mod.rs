//! Bounded retry with exponential backoff.

use crate::config::RetrySettings;
use crate::errors::{RetryDecision, ScrapeError, ScrapeResult};
use log::{info, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

pub type Classifier = fn(&ScrapeError) -> RetryDecision;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub classifier: Classifier,
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self::new(settings.max_attempts, settings.base_delay)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            classifier: ScrapeError::retry_decision,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Delay before attempt `attempt + 1`: `base * 2^(attempt - 1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `operation` until it succeeds, fails fatally, or the attempt ceiling
    /// is reached. The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> ScrapeResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ScrapeResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if (self.classifier)(&e) == RetryDecision::Fatal {
                        warn!("{} failed on attempt {} (not retried): {}", label, attempt, e);
                        return Err(e);
                    }
                    if attempt >= self.max_attempts {
                        warn!("{} failed after {} attempts: {}", label, attempt, e);
                        return Err(e);
                    }

                    let delay = self.delay_after(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {}. Retrying in {}ms",
                        label,
                        attempt,
                        self.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_delays_double() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_ceiling_counts_total_attempts() {
        let calls = AtomicU32::new(0);
        let result: ScrapeResult<()> = quick(3)
            .run("flaky", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(ScrapeError::timeout(
                        format!("attempt {}", attempt),
                        Duration::from_millis(1),
                    ))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("attempt 3"));
    }

    #[tokio::test]
    async fn test_fatal_errors_stop_immediately() {
        let calls = AtomicU32::new(0);
        let result: ScrapeResult<()> = quick(5)
            .run("fatal", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ScrapeError::UnexpectedLayout("3 names".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ScrapeError::UnexpectedLayout(_))));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let result = quick(3)
            .run("recovering", |attempt| async move {
                if attempt < 2 {
                    Err(ScrapeError::timeout("loading", Duration::from_millis(1)))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let calls = AtomicU32::new(0);
        let policy = quick(2).with_classifier(|_| RetryDecision::Retry);
        let _: ScrapeResult<()> = policy
            .run("always", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ScrapeError::Browser("boom".into())) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
