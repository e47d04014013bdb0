//! Retry policy and linear backoff
//!
//! Outbound sends are retried a bounded number of times. The attempt at
//! index `i` that fails is followed by a sleep of `i` backoff units, so the
//! first retry is immediate and the gaps grow by one unit each time.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Sleep added per failed attempt
    pub backoff_unit: Duration,
    /// Upper bound on a single attempt
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Linear backoff policy: 100 attempts, one second per unit, one second per attempt
    pub fn linear() -> Self {
        Self {
            max_attempts: 100,
            backoff_unit: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(1),
        }
    }

    /// Set the total number of attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the backoff unit
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Set the per-attempt timeout
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Delay following the failed attempt at index `attempt`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }

    /// Delays slept between attempts when every attempt fails
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(|attempt| self.calculate_delay(attempt))
    }

    /// Run `operation` until it succeeds or the attempts are exhausted.
    ///
    /// The closure receives the zero-based attempt index. No sleep follows
    /// the final attempt. A policy with `max_attempts == 0` still makes one
    /// attempt.
    pub async fn execute_with_context<F, Fut, T, E>(&self, mut operation: F) -> RetryResult<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let last_attempt = self.max_attempts.max(1) - 1;
        let mut attempt = 0;
        let mut total_delay = Duration::ZERO;

        loop {
            match operation(attempt).await {
                Ok(result) => {
                    return RetryResult {
                        result: Ok(result),
                        attempts: attempt + 1,
                        total_retry_delay: total_delay,
                    };
                }
                Err(err) => {
                    if attempt >= last_attempt {
                        return RetryResult {
                            result: Err(err),
                            attempts: attempt + 1,
                            total_retry_delay: total_delay,
                        };
                    }

                    let delay = self.calculate_delay(attempt);
                    total_delay += delay;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }

                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear()
    }
}

/// Result of a retry operation with statistics
#[derive(Debug, Clone)]
pub struct RetryResult<T, E> {
    /// Final result (success or the last failure)
    pub result: Result<T, E>,
    /// Number of attempts made
    pub attempts: u32,
    /// Total time spent waiting between retries
    pub total_retry_delay: Duration,
}

impl<T, E> RetryResult<T, E> {
    /// Check if operation succeeded
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Check if any retries were performed
    pub fn had_retries(&self) -> bool {
        self.attempts > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn linear_backoff_starts_at_zero() {
        let unit = Duration::from_millis(100);
        let policy = RetryPolicy::linear().with_backoff_unit(unit);
        assert_eq!(policy.calculate_delay(0), Duration::ZERO);
        assert_eq!(policy.calculate_delay(1), unit);
        assert_eq!(policy.calculate_delay(5), unit * 5);
    }

    #[test]
    fn huge_attempt_index_saturates() {
        let policy = RetryPolicy::linear().with_backoff_unit(Duration::MAX);
        assert_eq!(policy.calculate_delay(2), Duration::MAX);
    }

    #[test]
    fn delays_has_one_fewer_entry_than_attempts() {
        let policy = RetryPolicy::linear()
            .with_max_attempts(4)
            .with_backoff_unit(Duration::from_millis(10));
        let delays: Vec<_> = policy.delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::ZERO,
                Duration::from_millis(10),
                Duration::from_millis(20)
            ]
        );
    }

    #[tokio::test]
    async fn execute_stops_on_first_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear()
            .with_max_attempts(10)
            .with_backoff_unit(Duration::from_millis(1));

        let outcome = policy
            .execute_with_context(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err("transient")
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(outcome.result, Ok(2));
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.had_retries());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn execute_makes_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear()
            .with_max_attempts(3)
            .with_backoff_unit(Duration::from_millis(1));

        let outcome = policy
            .execute_with_context(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("down") }
            })
            .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.total_retry_delay, Duration::from_millis(1));
    }

    #[tokio::test]
    async fn zero_attempt_policy_still_tries_once() {
        let policy = RetryPolicy::linear().with_max_attempts(0);
        let outcome = policy
            .execute_with_context(|_| async { Err::<(), _>("down") })
            .await;
        assert_eq!(outcome.attempts, 1);
    }

    proptest! {
        #[test]
        fn linear_delays_strictly_increase(attempts in 2u32..64, unit_ms in 1u64..1_000) {
            let policy = RetryPolicy::linear()
                .with_max_attempts(attempts)
                .with_backoff_unit(Duration::from_millis(unit_ms));
            let delays: Vec<_> = policy.delays().collect();

            prop_assert_eq!(delays.len() as u32, attempts - 1);
            prop_assert_eq!(delays[0], Duration::ZERO);
            for pair in delays.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}
