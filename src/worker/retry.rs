//! Fixed-delay retry policy for the worker loop.

use std::time::Duration;

/// Fixed delay between attempts, optionally capped.
///
/// The default retries forever: a received record is never given up on
/// because nothing acknowledges it until processing completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// Give up after this many consecutive failures. `None` is unbounded.
    pub max_consecutive: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_consecutive: None,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_consecutive: None,
        }
    }

    pub fn with_cap(mut self, max_consecutive: u32) -> Self {
        self.max_consecutive = Some(max_consecutive);
        self
    }

    /// Has `failures` consecutive failures used up the policy?
    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_consecutive.is_some_and(|cap| failures > cap)
    }

    /// Count one more consecutive failure and report whether the policy is
    /// now exhausted. The counter saturates instead of wrapping.
    pub fn record_failure(&self, failures: &mut u32) -> bool {
        *failures = failures.saturating_add(1);
        self.exhausted(*failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_by_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay, Duration::from_secs(1));
        assert!(!policy.exhausted(u32::MAX));
    }

    #[test]
    fn cap_counts_retries_after_the_first_failure() {
        let policy = RetryPolicy::fixed(Duration::from_millis(10)).with_cap(2);
        assert!(!policy.exhausted(1));
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
    }

    #[test]
    fn failure_count_saturates_on_an_unbounded_policy() {
        let policy = RetryPolicy::fixed(Duration::ZERO);
        let mut failures = u32::MAX - 1;
        assert!(!policy.record_failure(&mut failures));
        assert!(!policy.record_failure(&mut failures));
        assert_eq!(failures, u32::MAX);
    }

    #[test]
    fn recorded_failures_hit_the_cap() {
        let policy = RetryPolicy::fixed(Duration::ZERO).with_cap(1);
        let mut failures = 0;
        assert!(!policy.record_failure(&mut failures));
        assert!(policy.record_failure(&mut failures));
    }
}
