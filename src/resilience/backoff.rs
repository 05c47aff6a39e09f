//! Exponential backoff with jitter for node reconnects.

use std::time::Duration;
use rand::Rng;

use crate::config::ReconnectConfig;

/// Delay before reconnect `attempt` (1-based).
///
/// `base_ms * 2^(attempt - 1)`, capped at `max_ms`, plus up to 10% jitter.
/// Attempt 0 is immediate.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Reconnect schedule derived from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    /// 0 means unlimited.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl ReconnectPolicy {
    /// Delay before `attempt` (1-based), or `None` once attempts are exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if !self.enabled || (self.max_attempts > 0 && attempt > self.max_attempts) {
            return None;
        }
        Some(calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms))
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_doubles_until_capped() {
        assert_eq!(calculate_backoff(0, 500, 30_000), Duration::ZERO);

        let first = calculate_backoff(1, 500, 30_000).as_millis();
        assert!((500..550).contains(&first));

        let third = calculate_backoff(3, 500, 30_000).as_millis();
        assert!((2_000..2_200).contains(&third));

        let capped = calculate_backoff(20, 500, 30_000).as_millis();
        assert!((30_000..33_000).contains(&capped));
    }

    #[test]
    fn policy_stops_after_max_attempts() {
        let policy = ReconnectPolicy::from(&ReconnectConfig {
            enabled: true,
            max_attempts: 2,
            base_delay_ms: 10,
            max_delay_ms: 100,
        });
        assert!(policy.delay_for(1).is_some());
        assert!(policy.delay_for(2).is_some());
        assert!(policy.delay_for(3).is_none());
    }

    #[test]
    fn unlimited_and_disabled_policies() {
        let mut policy = ReconnectPolicy::from(&ReconnectConfig {
            max_attempts: 0,
            ..Default::default()
        });
        assert!(policy.delay_for(1_000).is_some());

        policy.enabled = false;
        assert!(policy.delay_for(1).is_none());
    }
}
