use std::time::Duration;
use tokio::time::sleep;

/// Spaces out requests to the history endpoint so bursts of lookups
/// during a search don't trip throttling.
pub struct RateLimiter {
    delay: Duration,
    request_count: usize,
}

impl RateLimiter {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            request_count: 0,
        }
    }

    /// The first request goes out immediately; every later one waits.
    pub async fn wait(&mut self) {
        if self.should_wait() {
            self.apply_delay().await;
        }
        self.increment();
    }

    pub fn request_count(&self) -> usize {
        self.request_count
    }

    fn should_wait(&self) -> bool {
        self.request_count > 0
    }

    async fn apply_delay(&self) {
        sleep(self.delay).await;
    }

    fn increment(&mut self) {
        self.request_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_only_follow_up_requests_are_delayed() {
        let mut limiter = RateLimiter::new(50);

        let started = Instant::now();
        limiter.wait().await;
        assert!(started.elapsed() < Duration::from_millis(50));

        let started = Instant::now();
        limiter.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(limiter.request_count(), 2);
    }
}
