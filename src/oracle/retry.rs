/// Launch retry policy for oracle sessions
///
/// Attempt `k` (1-based) waits a liveness grace of `2 * k` grace units before
/// the spawned process is trusted. The budget is fixed per launch; a relaunch
/// after death starts from a fresh budget.
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum launch attempts before the launch is declared failed
    pub max_attempts: u32,
    /// One grace time unit, in milliseconds
    pub grace_unit_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            grace_unit_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, grace_unit: Duration) -> Self {
        Self {
            max_attempts,
            grace_unit_ms: grace_unit.as_millis() as u64,
        }
    }

    /// Liveness grace before trusting launch attempt `attempt` (1-based).
    pub fn grace_period(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.grace_unit_ms.saturating_mul(2 * attempt as u64))
    }

    /// Attempt numbers covered by the budget.
    pub fn attempts(&self) -> impl Iterator<Item = u32> {
        1..=self.max_attempts
    }

    /// Sum of all grace periods if every attempt fails.
    pub fn worst_case_wait(&self) -> Duration {
        self.attempts().map(|k| self.grace_period(k)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grace_escalates_linearly() {
        let policy = RetryPolicy::new(3, Duration::from_millis(5));
        assert_eq!(policy.grace_period(1), Duration::from_millis(10));
        assert_eq!(policy.grace_period(2), Duration::from_millis(20));
        assert_eq!(policy.grace_period(3), Duration::from_millis(30));
    }

    #[test]
    fn attempts_cover_the_budget() {
        let policy = RetryPolicy::new(4, Duration::from_millis(1));
        assert_eq!(policy.attempts().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(policy.worst_case_wait(), Duration::from_millis(2 + 4 + 6 + 8));
    }

    #[test]
    fn zero_budget_has_no_attempts() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1));
        assert_eq!(policy.attempts().count(), 0);
    }
}
