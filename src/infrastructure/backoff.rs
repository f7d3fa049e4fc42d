use std::time::Duration;

/// Exponential backoff policy for reconnection attempts.
///
/// Attempt counting starts at 1 for the first retry after a loss. Once the
/// count passes `max_attempts`, `next_delay` returns `None` and the caller
/// must stop scheduling attempts.
pub struct ReconnectPolicy {
    base_delay: Duration,
    multiplier: f64,
    max_delay: Option<Duration>,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(
        base_delay: Duration,
        multiplier: f64,
        max_delay: Option<Duration>,
        max_attempts: u32,
    ) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay,
            max_attempts,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    ///
    /// `delay(n) = min(base_delay * multiplier^(n-1), max_delay)`
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            return None;
        }

        let factor = self.multiplier.powi(self.attempts as i32 - 1);
        let mut delay = self.base_delay.mul_f64(factor);
        if let Some(cap) = self.max_delay {
            delay = delay.min(cap);
        }
        Some(delay)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_first_delay_is_base_delay() {
        let mut policy = ReconnectPolicy::new(millis(1_000), 2.0, None, 5);
        assert_eq!(policy.next_delay(), Some(millis(1_000)));
    }

    #[test]
    fn test_delays_grow_by_multiplier() {
        let mut policy = ReconnectPolicy::new(millis(1_000), 2.0, None, 5);
        assert_eq!(policy.next_delay(), Some(millis(1_000)));
        assert_eq!(policy.next_delay(), Some(millis(2_000)));
        assert_eq!(policy.next_delay(), Some(millis(4_000)));
    }

    #[test]
    fn test_cap_is_respected() {
        let mut policy = ReconnectPolicy::new(millis(1_000), 3.0, Some(millis(5_000)), 10);
        for _ in 0..10 {
            let delay = policy.next_delay().unwrap();
            assert!(delay <= millis(5_000));
        }
    }

    #[test]
    fn test_exhaustion_after_max_attempts() {
        let mut policy = ReconnectPolicy::new(millis(10), 1.0, None, 3);
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.attempts(), 4);
    }

    #[test]
    fn test_reset_restarts_the_sequence() {
        let mut policy = ReconnectPolicy::new(millis(100), 2.0, None, 2);
        policy.next_delay();
        policy.next_delay();
        assert_eq!(policy.next_delay(), None);

        policy.reset();
        assert_eq!(policy.next_delay(), Some(millis(100)));
    }
}
