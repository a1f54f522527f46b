//! Settings configuration loaded from TOML files.
//!
//! Non-sensitive tuning for the validation client, stored in the XDG config
//! directory (~/.config/chesscheck/config.toml).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::platform::Platform;

/// Default TOML configuration file content
const DEFAULT_CONFIG_TOML: &str = r#"# chesscheck configuration file
# Located at: ~/.config/chesscheck/config.toml
#
# Secrets are loaded from environment variables:
#   - LICHESS_API_TOKEN (optional, raises Lichess rate limits)

[cache]
ttl_seconds = 300
sweep_interval_seconds = 60

[client]
token_wait_seconds = 30
# user_agent = "chesscheck/0.1 (contact@example.com)"

[logging]
level = "info"

[platforms.lichess]
# base_url = "https://lichess.org"
connect_timeout_seconds = 5
request_timeout_seconds = 10
max_retries = 3
backoff_base_ms = 500
backoff_max_ms = 8000

[platforms.lichess.rate_limit]
capacity = 5
refill_per_second = 1.0

[platforms.lichess.circuit_breaker]
failure_threshold = 5
recovery_timeout_seconds = 60
success_threshold = 2

[platforms.chesscom]
# base_url = "https://api.chess.com"
connect_timeout_seconds = 5
request_timeout_seconds = 10
max_retries = 3
backoff_base_ms = 500
backoff_max_ms = 8000

[platforms.chesscom.rate_limit]
capacity = 3
refill_per_second = 1.0

[platforms.chesscom.circuit_breaker]
failure_threshold = 5
recovery_timeout_seconds = 60
success_threshold = 2
"#;

/// Settings loaded from TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Response cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Settings shared by every platform client
    #[serde(default)]
    pub client: ClientSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Per-platform tuning
    #[serde(default)]
    pub platforms: PlatformsSettings,
}

/// Response cache settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    /// How long a validation result is served from cache
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Interval of the background sweep removing expired entries
    #[serde(default = "default_cache_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

/// Settings shared by every platform client
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientSettings {
    /// Longest wait for a rate-limit token before giving up
    #[serde(default = "default_token_wait_seconds")]
    pub token_wait_seconds: u64,

    /// User-Agent header sent upstream
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Tuning for both platforms.
///
/// Each section is layered over that platform's own defaults, so a partial
/// `[platforms.chesscom]` keeps Chess.com's limits for the keys it omits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformsSettings {
    #[serde(
        default = "PlatformSettings::lichess",
        deserialize_with = "deserialize_lichess"
    )]
    pub lichess: PlatformSettings,

    #[serde(
        default = "PlatformSettings::chesscom",
        deserialize_with = "deserialize_chesscom"
    )]
    pub chesscom: PlatformSettings,
}

fn deserialize_lichess<'de, D>(deserializer: D) -> Result<PlatformSettings, D::Error>
where
    D: Deserializer<'de>,
{
    overlay_platform(deserializer, PlatformSettings::lichess())
}

fn deserialize_chesscom<'de, D>(deserializer: D) -> Result<PlatformSettings, D::Error>
where
    D: Deserializer<'de>,
{
    overlay_platform(deserializer, PlatformSettings::chesscom())
}

fn overlay_platform<'de, D>(
    deserializer: D,
    defaults: PlatformSettings,
) -> Result<PlatformSettings, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = toml::Value::deserialize(deserializer)?;
    let mut merged = toml::Value::try_from(defaults).map_err(D::Error::custom)?;
    merge_toml(&mut merged, overrides);
    merged.try_into().map_err(D::Error::custom)
}

/// Recursively copy keys of `overrides` onto `base`; nested tables merge.
fn merge_toml(base: &mut toml::Value, overrides: toml::Value) {
    match (base, overrides) {
        (toml::Value::Table(base), toml::Value::Table(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overrides) => *base = overrides,
    }
}

/// Tuning for a single platform client
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformSettings {
    /// API root override (defaults to the platform's public API)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// TCP/TLS connect timeout in seconds
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,

    /// Whole-request timeout in seconds
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds (doubles per attempt)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single retry delay in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
}

/// Token bucket sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitSettings {
    /// Maximum burst of requests
    #[serde(default = "default_rate_limit_capacity")]
    pub capacity: u32,

    /// Tokens added per second
    #[serde(default = "default_rate_limit_refill_per_second")]
    pub refill_per_second: f64,
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a trial request
    #[serde(default = "default_recovery_timeout_seconds")]
    pub recovery_timeout_seconds: u64,

    /// Successful trials needed to close a half-open circuit
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

// Default value functions

fn default_cache_ttl_seconds() -> u64 {
    300
}

fn default_cache_sweep_interval_seconds() -> u64 {
    60
}

fn default_token_wait_seconds() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("chesscheck/{}", env!("CARGO_PKG_VERSION"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_connect_timeout_seconds() -> u64 {
    5
}

fn default_request_timeout_seconds() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8000
}

fn default_rate_limit_capacity() -> u32 {
    5
}

fn default_rate_limit_refill_per_second() -> f64 {
    1.0
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_seconds() -> u64 {
    60
}

fn default_success_threshold() -> u32 {
    2
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl_seconds(),
            sweep_interval_seconds: default_cache_sweep_interval_seconds(),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            token_wait_seconds: default_token_wait_seconds(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for PlatformsSettings {
    fn default() -> Self {
        Self {
            lichess: PlatformSettings::lichess(),
            chesscom: PlatformSettings::chesscom(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: default_rate_limit_capacity(),
            refill_per_second: default_rate_limit_refill_per_second(),
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_seconds: default_recovery_timeout_seconds(),
            success_threshold: default_success_threshold(),
        }
    }
}

impl PlatformSettings {
    fn base() -> Self {
        Self {
            base_url: None,
            connect_timeout_seconds: default_connect_timeout_seconds(),
            request_timeout_seconds: default_request_timeout_seconds(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            rate_limit: RateLimitSettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
        }
    }

    /// Defaults for Lichess.
    pub fn lichess() -> Self {
        Self::base()
    }

    /// Defaults for Chess.com, which throttles unauthenticated callers harder.
    pub fn chesscom() -> Self {
        Self {
            rate_limit: RateLimitSettings {
                capacity: 3,
                refill_per_second: 1.0,
            },
            ..Self::base()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl CircuitBreakerSettings {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_seconds)
    }
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,
}

impl Settings {
    /// Load settings from the TOML configuration file.
    ///
    /// If the config file doesn't exist, creates it with default values.
    pub fn load() -> Result<Self, SettingsError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("Creating default configuration at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        Self::load_from_path(&config_path)
    }

    /// Load settings from a specific file path.
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Serialize settings to TOML content.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the configuration file path.
    ///
    /// Uses XDG config directory: `~/.config/chesscheck/config.toml`
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(override_dir) = std::env::var("CHESSCHECK_CONFIG_DIR") {
            let dir = PathBuf::from(override_dir);
            return Ok(dir.join("config.toml"));
        }

        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("chesscheck");

        Ok(config_dir.join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG_TOML)?;
        Ok(())
    }

    /// Tuning for `platform`.
    pub fn platform(&self, platform: Platform) -> &PlatformSettings {
        match platform {
            Platform::Lichess => &self.platforms.lichess,
            Platform::ChessCom => &self.platforms.chesscom,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_seconds)
    }

    pub fn token_wait(&self) -> Duration {
        Duration::from_secs(self.client.token_wait_seconds)
    }
}
