//! Delays between retries of transient store failures.
use std::time::Duration;

use rand::Rng as _;

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(100);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Decides how long to wait before the next attempt.
pub trait BackoffPolicy: Send + Sync {
    /// The delay before retry number `attempt`, starting at `1`.
    fn delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with jitter, capped at `max`.
///
/// The un-jittered delay for attempt `n` is `base * 2^(n-1)`, limited to
/// `max`. The returned delay is drawn uniformly from the upper half of that
/// value, so consecutive retries of different objects spread out while the
/// delay never exceeds `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl ExponentialBackoff {
    /// The delay for `attempt` before jitter is applied.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base.saturating_mul(1_u32 << exponent).min(self.max)
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        let half = ceiling / 2;
        let jitter_millis = rand::rng().random_range(0..=(ceiling - half).as_millis() as u64);
        half + Duration::from_millis(jitter_millis)
    }
}

/// Never waits, retries happen immediately.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoBackoff;

impl BackoffPolicy for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1, Duration::from_millis(100))]
    #[case(2, Duration::from_millis(200))]
    #[case(3, Duration::from_millis(400))]
    #[case(6, Duration::from_millis(3200))]
    #[case(7, Duration::from_secs(5))]
    #[case(u32::MAX, Duration::from_secs(5))]
    fn ceiling_doubles_until_max(#[case] attempt: u32, #[case] expected: Duration) {
        assert_eq!(ExponentialBackoff::default().ceiling(attempt), expected);
    }

    #[rstest]
    fn jittered_delay_stays_in_bounds(#[values(1, 2, 5, 10)] attempt: u32) {
        let backoff = ExponentialBackoff::default();
        let ceiling = backoff.ceiling(attempt);

        for _ in 0..100 {
            let delay = backoff.delay(attempt);
            assert!(delay >= ceiling / 2, "{delay:?} is below half of {ceiling:?}");
            assert!(delay <= ceiling, "{delay:?} exceeds {ceiling:?}");
        }
    }

    #[test]
    fn no_backoff() {
        assert_eq!(NoBackoff.delay(3), Duration::ZERO);
    }
}
