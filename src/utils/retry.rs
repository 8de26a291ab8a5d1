use log::warn;
use rand::Rng;
use tokio::time::{sleep, Duration};

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Cap for any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least one
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delay after the given failed attempt (1-based), before jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        let spread = (delay.as_millis() / 10) as u64;
        if spread == 0 {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0..=spread);
        (delay + Duration::from_millis(extra)).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_secs(1), Duration::from_secs(30))
    }
}

/// Runs `f` until it succeeds, the error is not retryable, or attempts run out
///
/// The last error is returned unchanged.
pub async fn with_retry<F, Fut, T, E, P>(policy: &RetryPolicy, is_retryable: P, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempts = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempts += 1;
                if attempts >= policy.max_attempts || !is_retryable(&e) {
                    return Err(e);
                }
                let delay = policy.jittered(attempts);
                warn!("Attempt {}/{} failed: {}; retrying in {:?}", attempts, policy.max_attempts, e, delay);
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(6, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Cell::new(0);
        let result: Result<&str, String> = with_retry(&fast_policy(4), |_| true, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { if n < 3 { Err(format!("fail {}", n)) } else { Ok("done") } }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), String> = with_retry(&fast_policy(3), |_| true, || {
            calls.set(calls.get() + 1);
            async { Err("still failing".to_string()) }
        })
        .await;

        assert_eq!(result, Err("still failing".to_string()));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), String> = with_retry(&fast_policy(5), |e: &String| e != "fatal", || {
            calls.set(calls.get() + 1);
            async { Err("fatal".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
