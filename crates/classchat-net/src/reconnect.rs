use std::time::Duration;

use rand::Rng;

use classchat_shared::constants::{
    DEFAULT_RECONNECT_ALERT_AFTER, DEFAULT_RECONNECT_INITIAL_MS, DEFAULT_RECONNECT_MAX_MS,
};

/// Backoff schedule for re-establishing a dropped room feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Consecutive failures after which the user is alerted.
    pub alert_after: u32,
    /// Randomize each delay into `[delay / 2, delay]`.
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(DEFAULT_RECONNECT_INITIAL_MS),
            max_delay: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
            alert_after: DEFAULT_RECONNECT_ALERT_AFTER,
            jitter: true,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if self.jitter && !delay.is_zero() {
            let factor = rand::thread_rng().gen_range(0.5..=1.0);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }

    pub fn should_alert(&self, failures: u32) -> bool {
        self.alert_after > 0 && failures >= self.alert_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed() -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            alert_after: 3,
            jitter: false,
        }
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = fixed();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(500), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = ReconnectPolicy {
            jitter: true,
            ..fixed()
        };
        for _ in 0..50 {
            let d = policy.delay_for(3);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_alert_threshold() {
        let policy = fixed();
        assert!(!policy.should_alert(2));
        assert!(policy.should_alert(3));

        let never = ReconnectPolicy {
            alert_after: 0,
            ..fixed()
        };
        assert!(!never.should_alert(100));
    }
}
