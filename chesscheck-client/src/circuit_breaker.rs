//! Per-platform circuit breaker.
//!
//! The breaker is a pure admission/feedback state machine: callers ask
//! [`CircuitBreaker::can_attempt`] before an upstream call and report the
//! outcome with [`CircuitBreaker::record_success`] or
//! [`CircuitBreaker::record_failure`]. It never performs I/O itself.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chesscheck_core::CircuitBreakerSettings;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests pass through; failures are counted.
    Closed,
    /// Upstream assumed down; requests fail fast.
    Open,
    /// Up to `success_threshold` trial requests at a time probe recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds for one breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in `Closed` that open the circuit.
    pub failure_threshold: u32,
    /// Time since the last failure before `Open` admits a trial request.
    pub recovery_timeout: Duration,
    /// Successes in `HalfOpen` needed to close again.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            recovery_timeout: settings.recovery_timeout(),
            success_threshold: settings.success_threshold.max(1),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    /// Trial requests admitted in `HalfOpen` that have not reported back.
    trials_in_flight: u32,
    last_trial: Option<Instant>,
}

impl BreakerState {
    fn admit_trial(&mut self) {
        self.trials_in_flight += 1;
        self.last_trial = Some(Instant::now());
    }
}

/// Three-state circuit breaker guarding one upstream.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// A closed breaker. `name` only labels log lines.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                trials_in_flight: 0,
                last_trial: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a request may be sent now.
    ///
    /// An open circuit whose recovery timeout has elapsed flips to
    /// `HalfOpen` as a side effect of this call. A half-open circuit admits
    /// at most `success_threshold` unreported trials; trials that never
    /// report back are written off after another recovery timeout.
    pub fn can_attempt(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if inner.trials_in_flight < self.config.success_threshold {
                    inner.admit_trial();
                    return true;
                }
                let stale = inner
                    .last_trial
                    .is_none_or(|at| at.elapsed() >= self.config.recovery_timeout);
                if stale {
                    warn!(breaker = %self.name, "Trial requests never reported, admitting a new one");
                    inner.trials_in_flight = 0;
                    inner.admit_trial();
                }
                stale
            }
            CircuitState::Open => {
                let recovered = inner
                    .last_failure
                    .is_none_or(|at| at.elapsed() >= self.config.recovery_timeout);
                if recovered {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    inner.trials_in_flight = 0;
                    inner.admit_trial();
                    info!(breaker = %self.name, "Circuit half-open, allowing trial request");
                }
                recovered
            }
        }
    }

    /// Report a healthy upstream response.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.trials_in_flight = 0;
                    info!(breaker = %self.name, "Circuit closed, upstream recovered");
                }
            }
            // A late success from a request admitted before the circuit opened
            CircuitState::Open => {}
        }
    }

    /// Report a failed upstream attempt.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "Circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.success_count = 0;
                inner.trials_in_flight = 0;
                warn!(breaker = %self.name, "Trial request failed, circuit re-opened");
            }
            CircuitState::Open => {}
        }
    }

    /// Current state, without triggering the open → half-open transition.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn success_count(&self) -> u32 {
        self.lock().success_count
    }
}
