//! # Exponential Backoff
//!
//! Provides a doubling backoff for reconcile retries, capped at a maximum.
//! Sequence with the defaults: 5s, 10s, 20s, 40s, 80s, 160s, 300s (max).

/// Exponential backoff calculator
///
/// Each call to `next_backoff_seconds()` returns the current delay and
/// doubles it for the next call, never exceeding `max_seconds`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Current backoff value in seconds
    current_seconds: u64,
    /// Maximum backoff value in seconds
    max_seconds: u64,
}

impl ExponentialBackoff {
    /// Create a new backoff with the given bounds in seconds.
    ///
    /// A zero minimum is raised to one second so the sequence can grow.
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        let min_seconds = min_seconds.max(1);
        Self {
            current_seconds: min_seconds,
            max_seconds: max_seconds.max(min_seconds),
        }
    }

    /// Get the next backoff duration in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_seconds;
        self.current_seconds = self.current_seconds.saturating_mul(2).min(self.max_seconds);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(5, 300);

        assert_eq!(backoff.next_backoff_seconds(), 5);
        assert_eq!(backoff.next_backoff_seconds(), 10);
        assert_eq!(backoff.next_backoff_seconds(), 20);
        assert_eq!(backoff.next_backoff_seconds(), 40);
        assert_eq!(backoff.next_backoff_seconds(), 80);
        assert_eq!(backoff.next_backoff_seconds(), 160);
        assert_eq!(backoff.next_backoff_seconds(), 300); // capped
        assert_eq!(backoff.next_backoff_seconds(), 300);
    }

    #[test]
    fn test_zero_minimum_is_raised() {
        let mut backoff = ExponentialBackoff::new(0, 4);
        assert_eq!(backoff.next_backoff_seconds(), 1);
        assert_eq!(backoff.next_backoff_seconds(), 2);
        assert_eq!(backoff.next_backoff_seconds(), 4);
        assert_eq!(backoff.next_backoff_seconds(), 4);
    }
}
