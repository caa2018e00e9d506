//! Bounded retries for rate-limited backend calls.
//!
//! Only failures classified as rate limits are retried, with a linear backoff of
//! `(attempt + 1) * base_delay`: 2s, then 4s with the default policy. Anything else is
//! returned to the caller on the spot.

use crate::backend::BackendError;
use crate::config::PipelineConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// How many times to try a call and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Linear backoff step.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl From<&PipelineConfig> for RetryPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.retry_base_delay,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1)
    }
}

/// Run `call` until it succeeds, fails with a non-rate-limit error, or attempts run out.
///
/// `call` receives the zero-based attempt number. On exhaustion the last rate-limit error
/// is returned.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut call: F) -> Result<T, BackendError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match call(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_rate_limited() && attempt + 1 < max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Rate limited; backing off before retry"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn rate_limited() -> BackendError {
        BackendError::RateLimited {
            status: Some(429),
            message: "slow down".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_rate_limits_with_linear_backoff() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = with_retry(RetryPolicy::default(), |_| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err(rate_limited())
                } else {
                    Ok("summary")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "summary");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = with_retry(RetryPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BackendError::Response("bad json".into())) }
        })
        .await;

        assert!(matches!(result, Err(BackendError::Response(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_surfaces_last_rate_limit() {
        let attempts_seen = std::sync::Mutex::new(Vec::new());

        let result: Result<(), _> = with_retry(RetryPolicy::default(), |attempt| {
            attempts_seen.lock().unwrap().push(attempt);
            async move {
                Err(BackendError::RateLimited {
                    status: Some(429),
                    message: format!("attempt {attempt}"),
                })
            }
        })
        .await;

        assert!(
            matches!(result, Err(BackendError::RateLimited { ref message, .. }) if message == "attempt 2")
        );
        assert_eq!(*attempts_seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn response_text_signalling_rate_limit_is_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(RetryPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BackendError::Response("daemon error: rate limit reached".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_endpoint_on_port_with_429_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(RetryPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(BackendError::Unavailable(
                    "failed to reach http://127.0.0.1:54290/api/generate: connection refused"
                        .into(),
                ))
            }
        })
        .await;
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn single_attempt_policy_never_sleeps() {
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_secs(60),
        };
        let result: Result<(), _> = with_retry(policy, |_| async { Err(rate_limited()) }).await;
        assert!(result.unwrap_err().is_rate_limited());
    }
}
