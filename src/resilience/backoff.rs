//! Exponential backoff strategy for retry policies.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            initial,
            max,
            factor,
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let base_ms = self.initial.as_millis() as f64 * self.factor.powi(exponent);
        let capped_ms = base_ms.min(self.max.as_millis() as f64);

        let delay_ms = if self.jitter > 0.0 {
            let spread = capped_ms * self.jitter;
            let low = (capped_ms - spread).max(0.0);
            rand::rng().random_range(low..=capped_ms + spread)
        } else {
            capped_ms
        };

        Duration::from_millis(delay_ms as u64)
    }
}

impl Default for ExponentialBackoff {
    /// Delays of 2s, 4s, 8s for attempts 1-3, no jitter.
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(60),
            factor: 2.0,
            jitter: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoff_schedule() {
        let backoff = ExponentialBackoff::default();

        assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_max_clamp() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(500), 2.0);

        assert_eq!(backoff.delay_for(10), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_band() {
        // Base delay for attempt 1 is 2s; a 0.5 jitter spreads it over
        // 1s..=3s.
        let backoff = ExponentialBackoff::default().with_jitter(0.5);
        for _ in 0..50 {
            let delay = backoff.delay_for(1);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(3));
        }
    }
}
