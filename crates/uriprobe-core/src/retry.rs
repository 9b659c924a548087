use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Exponential backoff for connection attempts.
///
/// `max_attempts` counts every attempt including the first one. The wait
/// before retry `n` (zero-based count of failures so far) is
/// `base_delay * 2^n`; there is no wait after the final failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once and never sleeps.
    pub const fn single_attempt() -> Self {
        Self {
            base_delay_ms: 0,
            max_attempts: 1,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Backoff before the retry that follows failure number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Whether another attempt is allowed after `failures` failed ones.
    pub fn allows_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts.max(1)
    }

    /// Total time slept when every attempt fails.
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.delay_for_attempt(attempt))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
    }

    #[test]
    fn worst_case_skips_final_sleep() {
        assert_eq!(
            RetryPolicy::default().worst_case_wait(),
            Duration::from_millis(1500)
        );
        assert_eq!(RetryPolicy::single_attempt().worst_case_wait(), Duration::ZERO);
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        let policy = RetryPolicy {
            base_delay_ms: 500,
            max_attempts: 100,
        };
        assert_eq!(policy.delay_for_attempt(90), Duration::from_millis(u64::MAX));
    }
}
