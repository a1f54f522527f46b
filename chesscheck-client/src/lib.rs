//! Resilient username validation against lichess and chess.com.
//!
//! Each lookup goes through a response cache, request coalescing, a
//! per-platform token bucket and a per-platform circuit breaker with retry.
//! [`ChessClient`] is the entry point.

pub mod cache;
pub mod circuit_breaker;
pub mod client;
pub mod error;
pub mod in_flight;
pub mod platform_client;
pub mod rate_limiter;
pub mod retry;
pub mod transport;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{ChessClient, ClientStats, PlatformStats};
pub use error::{RetryError, UpstreamError, ValidationError};
pub use platform_client::{PlatformClient, PlatformOptions, UserValidation, ValidationResult};
pub use rate_limiter::TokenBucket;
pub use retry::RetryPolicy;
pub use transport::{HttpUserLookup, TransportConfig, UserLookup};

pub use chesscheck_core::Platform;
