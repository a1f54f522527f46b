//! Configuration management for chesscheck.
//!
//! Secrets come from environment variables, settings from a TOML file.
//!
//! # Configuration Sources
//!
//! ## Secrets (Environment Variables)
//! - `LICHESS_API_TOKEN` - optional Lichess token
//!
//! ## Settings (TOML File)
//! Located at `~/.config/chesscheck/config.toml`:
//! ```toml
//! [cache]
//! ttl_seconds = 300
//!
//! [platforms.chesscom.rate_limit]
//! capacity = 3
//! refill_per_second = 1.0
//! ```

mod secrets;
mod settings;

use crate::platform::Platform;

pub use secrets::Secrets;
pub use settings::{
    CacheSettings, CircuitBreakerSettings, ClientSettings, LoggingSettings, PlatformSettings,
    PlatformsSettings, RateLimitSettings, Settings, SettingsError,
};

/// Combined configuration containing both secrets and settings.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Secrets loaded from environment variables
    pub secrets: Secrets,
    /// Settings loaded from TOML configuration file
    pub settings: Settings,
}

/// Errors that can occur when loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Invalid setting for {platform}: {reason}")]
    InvalidSetting { platform: Platform, reason: String },
}

impl Config {
    /// Load configuration from all sources and validate it.
    pub fn load() -> Result<Self, ConfigError> {
        let secrets = Secrets::from_env();
        let settings = Settings::load()?;
        Self::new(settings, secrets)
    }

    /// Build a configuration from parts, validating the settings.
    pub fn new(settings: Settings, secrets: Secrets) -> Result<Self, ConfigError> {
        let config = Self { secrets, settings };
        config.validate()?;
        Ok(config)
    }

    /// Check every platform's tuning for values the client cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for platform in Platform::ALL {
            let tuning = self.settings.platform(platform);
            let invalid = |reason: &str| ConfigError::InvalidSetting {
                platform,
                reason: reason.to_string(),
            };

            if tuning.rate_limit.capacity == 0 {
                return Err(invalid("rate_limit.capacity must be at least 1"));
            }
            let refill = tuning.rate_limit.refill_per_second;
            if !refill.is_finite() || refill <= 0.0 {
                return Err(invalid("rate_limit.refill_per_second must be positive"));
            }
            if tuning.circuit_breaker.failure_threshold == 0 {
                return Err(invalid("circuit_breaker.failure_threshold must be at least 1"));
            }
            if tuning.circuit_breaker.success_threshold == 0 {
                return Err(invalid("circuit_breaker.success_threshold must be at least 1"));
            }
            if tuning.backoff_max_ms < tuning.backoff_base_ms {
                return Err(invalid("backoff_max_ms must not be below backoff_base_ms"));
            }
            if let Some(base_url) = tuning.base_url.as_deref() {
                let parsed = url::Url::parse(base_url)
                    .map_err(|e| invalid(&format!("base_url {:?}: {}", base_url, e)))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(invalid("base_url must use http or https"));
                }
            }
        }
        Ok(())
    }

    /// API root for `platform`, honoring a configured override.
    pub fn base_url(&self, platform: Platform) -> &str {
        self.settings
            .platform(platform)
            .base_url
            .as_deref()
            .unwrap_or_else(|| platform.default_base_url())
    }
}
