//! Retry with exponential backoff around a single upstream call.
//!
//! Every attempt is admitted by the platform's circuit breaker and reports
//! back to it. Only transient failures are retried.

use std::future::Future;
use std::time::Duration;

use chesscheck_core::PlatformSettings;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{RetryError, UpstreamError};

/// Retry budget and backoff curve.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each later one.
    pub base_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl From<&PlatformSettings> for RetryPolicy {
    fn from(settings: &PlatformSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.backoff_base_ms),
            max_delay: Duration::from_millis(settings.backoff_max_ms),
        }
    }
}

impl RetryPolicy {
    /// Backoff after failed attempt number `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `request` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// An open circuit ends the loop immediately without calling `request`
    /// and without waiting.
    pub async fn execute<F, Fut, T>(
        &self,
        breaker: &CircuitBreaker,
        mut request: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempt = 0;
        loop {
            if !breaker.can_attempt() {
                warn!(attempt, "Circuit open, failing fast");
                return Err(RetryError::CircuitOpen);
            }

            match request().await {
                Ok(value) => {
                    breaker.record_success();
                    return Ok(value);
                }
                Err(err) => {
                    breaker.record_failure();

                    if !err.is_transient() {
                        debug!(attempt, error = %err, "Non-transient upstream error, not retrying");
                        return Err(err.into());
                    }
                    if attempt >= self.max_retries {
                        warn!(attempt, error = %err, "Retries exhausted");
                        return Err(err.into());
                    }

                    let delay = err
                        .retry_after()
                        .map_or(self.delay_for(attempt), |hint| {
                            hint.max(self.delay_for(attempt))
                        })
                        .min(self.max_delay);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient upstream error, retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }

    fn breaker(failure_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold,
                recovery_timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
        )
    }

    #[test]
    fn delays_double_and_cap() {
        let policy = policy(10);
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(8));
        assert_eq!(policy.delay_for(64), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_then_success() {
        let cb = breaker(10);
        let calls = AtomicU32::new(0);
        let call_times = Mutex::new(Vec::new());

        let result = policy(3)
            .execute(&cb, || {
                call_times.lock().unwrap().push(Instant::now());
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(UpstreamError::Timeout("slow".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two failures recorded, then the success reset the count
        assert_eq!(cb.failure_count(), 0);

        let times = call_times.lock().unwrap();
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps.len(), 2);
        assert!(gaps.windows(2).all(|g| g[0] <= g[1]), "gaps {:?}", gaps);
        assert!(gaps[0] >= Duration::from_millis(500) && gaps[0] < Duration::from_millis(510));
        assert!(gaps[1] >= Duration::from_secs(1) && gaps[1] < Duration::from_millis(1010));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_recorded_against_breaker() {
        let cb = breaker(10);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy(4)
            .execute(&cb, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(UpstreamError::Connection("reset".into())) }
            })
            .await;

        assert_eq!(
            result,
            Err(RetryError::Upstream(UpstreamError::Connection("reset".into())))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(cb.failure_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_is_not_retried() {
        let cb = breaker(10);
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = policy(3)
            .execute(&cb, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(UpstreamError::UnexpectedStatus {
                        status: 400,
                        body: "bad request".into(),
                    })
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(RetryError::Upstream(UpstreamError::UnexpectedStatus { status: 400, .. }))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cb.failure_count(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_stops_retries_without_calling() {
        let cb = breaker(2);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy(5)
            .execute(&cb, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(UpstreamError::Timeout("slow".into())) }
            })
            .await;

        assert_eq!(result, Err(RetryError::CircuitOpen));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cb.state(), CircuitState::Open);

        let start = Instant::now();
        let again: Result<(), _> = policy(5)
            .execute(&cb, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert_eq!(again, Err(RetryError::CircuitOpen));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_hint_extends_backoff() {
        let cb = breaker(10);
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = policy(1)
            .execute(&cb, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(UpstreamError::RateLimited {
                            retry_after: Some(Duration::from_secs(3)),
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(()));
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(3) && waited < Duration::from_millis(3010));
    }
}
