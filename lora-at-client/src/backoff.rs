//! Join retry backoff

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Margin added to a modem-reported channel free time
pub const CHANNEL_FREE_MARGIN: Duration = Duration::from_millis(100);

/// Capped exponential backoff
///
/// The delay after failed attempt `n` (1-based) is `initial * 2^(n-1)`,
/// capped at `max`. Within one join call the delay never decreases and is
/// never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Nominal delay after failed attempt `attempt`
    pub fn delay_for(&self, attempt: u8) -> Duration {
        let initial = self.initial.max(Duration::from_millis(1));
        let max = self.max.max(initial);
        let shift = u32::from(attempt.saturating_sub(1)).min(31);
        initial.saturating_mul(1u32 << shift).min(max)
    }

    /// Delay after failed attempt `attempt`
    ///
    /// # Arguments
    /// * `attempt` - 1-based number of the attempt that just failed
    /// * `channel_free` - Time until the modem has a free channel, if it says
    /// * `previous` - Delay computed after the previous failure
    pub fn next_delay(&self, attempt: u8, channel_free: Option<Duration>, previous: Duration) -> Duration {
        let mut delay = self.delay_for(attempt);
        if let Some(free) = channel_free {
            delay = delay.max(free + CHANNEL_FREE_MARGIN);
        }
        delay.max(previous)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capped_exponential() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(7), Duration::from_secs(60));
        assert_eq!(policy.delay_for(255), Duration::from_secs(60));
    }

    #[test]
    fn test_channel_free_floor_and_monotonic() {
        let policy = BackoffPolicy::default();
        let first = policy.next_delay(1, Some(Duration::from_secs(3)), Duration::ZERO);
        assert_eq!(first, Duration::from_millis(3100));
        // 2 s nominal, but never below the previous delay
        let second = policy.next_delay(2, None, first);
        assert_eq!(second, first);
    }

    #[test]
    fn test_never_zero() {
        let policy = BackoffPolicy::new(Duration::ZERO, Duration::ZERO);
        assert!(policy.next_delay(1, None, Duration::ZERO) > Duration::ZERO);
    }
}
