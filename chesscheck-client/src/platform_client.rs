//! One platform's resilient validation pipeline.
//!
//! cache → in-flight coalescing → token bucket → circuit breaker + retry →
//! cache write → fan-out to waiters.

use std::sync::Arc;
use std::time::Duration;

use chesscheck_core::{Config, Platform};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{TimedCache, cache_key};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::{UpstreamError, ValidationError};
use crate::in_flight::InFlight;
use crate::rate_limiter::TokenBucket;
use crate::retry::RetryPolicy;
use crate::transport::{HttpUserLookup, TransportConfig, UserLookup};

/// Operation name mixed into cache keys.
pub const VALIDATE_USER: &str = "validate_user";

/// Result of an existence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserValidation {
    pub exists: bool,
    pub message: String,
}

impl UserValidation {
    pub fn found() -> Self {
        Self {
            exists: true,
            message: "found".to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            exists: false,
            message: "not found".to_string(),
        }
    }
}

pub type ValidationResult = Result<UserValidation, ValidationError>;
pub type ResponseCache = TimedCache<String, UserValidation>;
pub type PendingRequests = InFlight<ValidationResult>;

/// Per-platform limits and timings.
#[derive(Debug, Clone)]
pub struct PlatformOptions {
    pub rate_capacity: u32,
    pub refill_per_second: f64,
    pub breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
    /// Longest wait for a rate-limit token.
    pub token_wait: Duration,
    pub cache_ttl: Duration,
}

impl PlatformOptions {
    pub fn from_config(config: &Config, platform: Platform) -> Self {
        let tuning = config.settings.platform(platform);
        Self {
            rate_capacity: tuning.rate_limit.capacity,
            refill_per_second: tuning.rate_limit.refill_per_second,
            breaker: CircuitBreakerConfig::from(&tuning.circuit_breaker),
            retry: RetryPolicy::from(tuning),
            token_wait: config.settings.token_wait(),
            cache_ttl: config.settings.cache_ttl(),
        }
    }
}

/// Everything needed to validate usernames on one platform.
pub struct PlatformClient {
    platform: Platform,
    lookup: Arc<dyn UserLookup>,
    limiter: TokenBucket,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    token_wait: Duration,
    cache_ttl: Duration,
    cache: Arc<ResponseCache>,
    pending: Arc<PendingRequests>,
}

impl std::fmt::Debug for PlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformClient")
            .field("platform", &self.platform)
            .field("limiter", &self.limiter)
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

impl PlatformClient {
    pub fn new(
        platform: Platform,
        lookup: Arc<dyn UserLookup>,
        options: PlatformOptions,
        cache: Arc<ResponseCache>,
        pending: Arc<PendingRequests>,
    ) -> Self {
        Self {
            platform,
            lookup,
            limiter: TokenBucket::new(options.rate_capacity, options.refill_per_second),
            breaker: CircuitBreaker::new(platform.as_str(), options.breaker),
            retry: options.retry,
            token_wait: options.token_wait,
            cache_ttl: options.cache_ttl,
            cache,
            pending,
        }
    }

    /// Build the production client: pooled HTTP transport plus configured limits.
    pub fn from_config(
        config: &Config,
        platform: Platform,
        cache: Arc<ResponseCache>,
        pending: Arc<PendingRequests>,
    ) -> Result<Self, UpstreamError> {
        let tuning = config.settings.platform(platform);
        let transport = TransportConfig {
            base_url: config.base_url(platform).to_string(),
            connect_timeout: tuning.connect_timeout(),
            request_timeout: tuning.request_timeout(),
            user_agent: config.settings.client.user_agent.clone(),
            bearer_token: match platform {
                Platform::Lichess => config.secrets.lichess_api_token.clone(),
                Platform::ChessCom => None,
            },
        };
        let lookup = HttpUserLookup::new(platform, &transport)?;
        Ok(Self::new(
            platform,
            Arc::new(lookup),
            PlatformOptions::from_config(config, platform),
            cache,
            pending,
        ))
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn limiter(&self) -> &TokenBucket {
        &self.limiter
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Normalize `username` and derive its cache key.
    pub fn key_for(&self, username: &str) -> Result<(String, String), ValidationError> {
        let normalized = self.platform.normalize_username(username);
        self.platform
            .validate_username(&normalized)
            .map_err(ValidationError::InvalidUsername)?;
        let key = cache_key(VALIDATE_USER, self.platform, &normalized);
        Ok((normalized, key))
    }

    /// Check whether `username` exists on this platform.
    pub async fn validate_user(&self, username: &str) -> ValidationResult {
        let (normalized, key) = self.key_for(username)?;

        if let Some(hit) = self.cache.get(&key).await {
            debug!(platform = %self.platform, username = %normalized, "Cache hit");
            return Ok(hit);
        }

        self.pending
            .run(&key, || self.fetch_and_cache(&normalized, &key))
            .await
    }

    /// Owner path: admission, upstream call, cache write.
    async fn fetch_and_cache(&self, username: &str, key: &str) -> ValidationResult {
        // A previous owner may have finished between our cache miss and registration
        if let Some(hit) = self.cache.get(&key.to_string()).await {
            debug!(platform = %self.platform, username, "Cache filled while registering");
            return Ok(hit);
        }

        if !self.limiter.wait_for_token(1, self.token_wait).await {
            warn!(
                platform = %self.platform,
                username,
                wait_secs = self.token_wait.as_secs(),
                "Timed out waiting for rate-limit token"
            );
            return Err(ValidationError::RateLimited);
        }

        let lookup = &self.lookup;
        let outcome = self
            .retry
            .execute(&self.breaker, || lookup.lookup(username))
            .await
            .map_err(|err| ValidationError::from_retry(self.platform, err))?;

        self.cache
            .set(key.to_string(), outcome.clone(), self.cache_ttl)
            .await;
        debug!(
            platform = %self.platform,
            username,
            exists = outcome.exists,
            "Validation result cached"
        );
        Ok(outcome)
    }

    /// Drop any cached result for `username`.
    pub async fn invalidate(&self, username: &str) -> Result<bool, ValidationError> {
        let (_, key) = self.key_for(username)?;
        Ok(self.cache.invalidate(&key).await)
    }
}
