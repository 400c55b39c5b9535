use std::time::Duration;

/// Fixed backoff schedule for transient fetch failures.
///
/// A pure mapping from attempt number to the delay before the next attempt,
/// decoupled from the I/O call it wraps.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            delays: [2, 5, 15, 30, 60]
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
        }
    }
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        RetryPolicy { delays }
    }

    /// A policy that never retries. Used by tests to keep failures fast.
    pub fn none() -> Self {
        RetryPolicy { delays: Vec::new() }
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based), or
    /// `None` once the schedule is exhausted.
    pub fn backoff(&self, attempt: usize) -> Option<Duration> {
        attempt
            .checked_sub(1)
            .and_then(|index| self.delays.get(index))
            .copied()
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_then_gives_up() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.backoff(2), Some(Duration::from_secs(5)));
        assert_eq!(policy.backoff(3), Some(Duration::from_secs(15)));
        assert_eq!(policy.backoff(4), Some(Duration::from_secs(30)));
        assert_eq!(policy.backoff(5), Some(Duration::from_secs(60)));
        assert_eq!(policy.backoff(6), None);
        assert_eq!(policy.max_attempts(), 6);
    }

    #[test]
    fn empty_schedule_means_single_attempt() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.backoff(1), None);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn attempt_zero_is_not_a_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), None);
    }
}
