//! Per-platform token bucket.
//!
//! Tokens refill lazily from elapsed time on every acquisition attempt, so
//! there is no background task and an idle bucket costs nothing.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// How often `wait_for_token` re-checks the bucket.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Absorbs rounding from summing many small refills.
const EPSILON: f64 = 1e-9;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Non-blocking token bucket with lazy refill.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// A full bucket holding `capacity` tokens, refilled at `refill_rate` tokens/second.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = f64::from(capacity);
        Self {
            capacity,
            refill_rate: refill_rate.max(0.0),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn refilled(&self, state: &BucketState, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        (state.tokens + elapsed * self.refill_rate).min(self.capacity)
    }

    /// Try to take `n` tokens without waiting.
    ///
    /// A request for more than `capacity` tokens never succeeds.
    pub fn acquire(&self, n: u32) -> bool {
        let wanted = f64::from(n);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        state.tokens = self.refilled(&state, now);
        state.last_refill = now;

        if state.tokens + EPSILON >= wanted {
            state.tokens = (state.tokens - wanted).max(0.0);
            true
        } else {
            false
        }
    }

    /// Poll `acquire` every [`POLL_INTERVAL`] until it succeeds or `timeout` passes.
    pub async fn wait_for_token(&self, n: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.acquire(n) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Tokens currently available, without consuming or storing anything.
    pub fn available(&self) -> f64 {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refilled(&state, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_then_refill() {
        let bucket = TokenBucket::new(2, 1.0);
        assert!(bucket.acquire(1));
        assert!(bucket.acquire(1));
        assert!(!bucket.acquire(1));

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(bucket.acquire(1));
        assert!(!bucket.acquire(1));
    }

    #[tokio::test(start_paused = true)]
    async fn full_capacity_after_refill_window() {
        let bucket = TokenBucket::new(4, 2.0);
        assert!(bucket.acquire(4));
        assert!(!bucket.acquire(4));

        // capacity / refill_rate = 2s
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(bucket.acquire(4));
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_stay_within_bounds() {
        let bucket = TokenBucket::new(3, 5.0);
        for step in 0..50 {
            bucket.acquire(if step % 3 == 0 { 2 } else { 1 });
            let available = bucket.available();
            assert!(available >= 0.0, "negative tokens: {}", available);
            assert!(available <= 3.0, "overfilled bucket: {}", available);
            tokio::time::advance(Duration::from_millis(70 * (step % 4))).await;
        }

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(bucket.available(), 3.0);
    }

    #[test]
    fn over_capacity_request_never_succeeds() {
        let bucket = TokenBucket::new(2, 100.0);
        assert!(!bucket.acquire(3));
        // Failed attempts do not debit
        assert!(bucket.acquire(2));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_token_succeeds_after_refill() {
        let bucket = TokenBucket::new(1, 1.0);
        assert!(bucket.acquire(1));

        let start = Instant::now();
        assert!(bucket.wait_for_token(1, Duration::from_secs(5)).await);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(900), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(1100), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_token_times_out() {
        let bucket = TokenBucket::new(1, 0.1);
        assert!(bucket.acquire(1));

        let start = Instant::now();
        assert!(!bucket.wait_for_token(1, Duration::from_millis(500)).await);
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[test]
    fn available_does_not_consume() {
        let bucket = TokenBucket::new(2, 1.0);
        assert_eq!(bucket.available(), 2.0);
        assert_eq!(bucket.available(), 2.0);
        assert!(bucket.acquire(2));
    }
}
