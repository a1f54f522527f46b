pub mod config;
pub mod platform;

pub use config::{
    CacheSettings, CircuitBreakerSettings, ClientSettings, Config, ConfigError, LoggingSettings,
    PlatformSettings, RateLimitSettings, Secrets, Settings, SettingsError,
};
pub use platform::{MAX_USERNAME_LEN, Platform};

/// Load .env file if it exists
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}
