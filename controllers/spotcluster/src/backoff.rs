//! # Per-item exponential backoff
//!
//! Tracks consecutive failures per object and turns them into retry
//! delays: `base * 2^failures`, capped at `max`.
//!
//! Defaults follow the usual controller retry limits: 5ms base,
//! 1000s cap.

use std::collections::HashMap;
use std::time::Duration;

/// Default delay after the first failure
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Default upper bound on a retry delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// Exponential backoff keyed by object
#[derive(Debug, Clone)]
pub struct ItemBackoff {
    base: Duration,
    max: Duration,
    failures: HashMap<String, u32>,
}

impl Default for ItemBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl ItemBackoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: HashMap::new(),
        }
    }

    /// Record a failure of `key` and return how long to wait before retrying
    pub fn next_delay(&mut self, key: &str) -> Duration {
        let failures = self.failures.entry(key.to_string()).or_insert(0);
        let delay = Self::calculate_for_failures(*failures, self.base, self.max);
        *failures = failures.saturating_add(1);
        delay
    }

    /// Reset the failure count of `key`
    pub fn forget(&mut self, key: &str) {
        self.failures.remove(key);
    }

    /// Consecutive failures recorded for `key`
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Delay for a given number of earlier failures (stateless)
    ///
    /// The sequence for the defaults is 5ms, 10ms, 20ms, ... up to 1000s.
    #[must_use]
    pub fn calculate_for_failures(failures: u32, base: Duration, max: Duration) -> Duration {
        2u32.checked_pow(failures)
            .and_then(|factor| base.checked_mul(factor))
            .map_or(max, |delay| delay.min(max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_per_failure() {
        let mut backoff = ItemBackoff::default();
        assert_eq!(backoff.next_delay("workers"), Duration::from_millis(5));
        assert_eq!(backoff.next_delay("workers"), Duration::from_millis(10));
        assert_eq!(backoff.next_delay("workers"), Duration::from_millis(20));
        assert_eq!(backoff.num_requeues("workers"), 3);

        // Other keys are tracked independently
        assert_eq!(backoff.next_delay("other"), Duration::from_millis(5));
    }

    #[test]
    fn test_delay_is_capped() {
        assert_eq!(
            ItemBackoff::calculate_for_failures(18, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY),
            Duration::from_secs(1000)
        );
        assert_eq!(
            ItemBackoff::calculate_for_failures(64, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY),
            Duration::from_secs(1000)
        );
        assert_eq!(
            ItemBackoff::calculate_for_failures(17, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY),
            Duration::from_millis(5 * 131_072)
        );
    }

    #[test]
    fn test_forget_resets() {
        let mut backoff = ItemBackoff::default();
        backoff.next_delay("workers");
        backoff.next_delay("workers");
        backoff.forget("workers");
        assert_eq!(backoff.num_requeues("workers"), 0);
        assert_eq!(backoff.next_delay("workers"), Duration::from_millis(5));
    }
}
