use std::time::Duration;
use tigerhost_addons_config::TaskConfig;

/// Delay policy for re-polling a provision that is not ready yet.
///
/// A provider hint is clamped to `[min, max]`. Without a hint the delay grows
/// exponentially from `initial`, capped at `max`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    initial: Duration,
    min: Duration,
    max: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    pub fn new(initial: Duration, min: Duration, max: Duration) -> Self {
        Self {
            initial,
            min,
            max,
            multiplier: 2.0,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn from_config(tasks: &TaskConfig) -> Self {
        Self::new(
            Duration::from_secs(tasks.default_retry_delay_secs),
            Duration::from_secs(tasks.min_retry_delay_secs),
            Duration::from_secs(tasks.max_retry_delay_secs),
        )
        .with_multiplier(tasks.retry_multiplier)
    }

    /// Hint-less delay for the zero-based `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = if attempt == 0 {
            self.initial
        } else {
            let multiplier = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
            let delay_ms = self.initial.as_millis() as f64 * multiplier;
            let delay_ms = delay_ms.min(self.max.as_millis() as f64);
            Duration::from_millis(delay_ms as u64)
        };
        self.bound(delay)
    }

    /// Delay before the next poll given the provider's hint in seconds
    pub fn delay_for(&self, retry_after_secs: u64, attempt: u32) -> Duration {
        if retry_after_secs == 0 {
            self.backoff(attempt)
        } else {
            self.bound(Duration::from_secs(retry_after_secs))
        }
    }

    fn bound(&self, delay: Duration) -> Duration {
        delay.max(self.min).min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TaskConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(1),
            Duration::from_millis(500),
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_backoff_progression() {
        let policy = policy();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(4), Duration::from_secs(10));
        assert_eq!(policy.backoff(60), Duration::from_secs(10));
    }

    #[test]
    fn test_custom_multiplier() {
        let policy = policy().with_multiplier(3.0);
        assert_eq!(policy.backoff(1), Duration::from_secs(3));
        assert_eq!(policy.backoff(2), Duration::from_secs(9));
    }

    #[test]
    fn test_provider_hint_is_clamped() {
        let policy = policy();
        assert_eq!(policy.delay_for(5, 7), Duration::from_secs(5));
        assert_eq!(policy.delay_for(3600, 0), Duration::from_secs(10));
        assert_eq!(policy.delay_for(0, 1), Duration::from_secs(2));
    }

    #[test]
    fn test_default_matches_task_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(30));
        assert_eq!(policy.delay_for(1, 0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(100_000, 0), Duration::from_secs(600));
    }
}
