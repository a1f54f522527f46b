//! Secrets configuration loaded from environment variables only.

use std::env;

/// Secrets loaded exclusively from environment variables.
#[derive(Clone, Default)]
pub struct Secrets {
    /// Lichess personal API token (env: LICHESS_API_TOKEN)
    pub lichess_api_token: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field(
                "lichess_api_token",
                &self.lichess_api_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Secrets {
    /// Load secrets from environment variables.
    ///
    /// Loads a .env file first if present (development convenience).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self::from_env_inner()
    }

    pub(crate) fn from_env_inner() -> Self {
        Self {
            lichess_api_token: env::var("LICHESS_API_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),
        }
    }
}
