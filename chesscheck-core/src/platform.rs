//! Supported chess platforms and their username rules.

use serde::{Deserialize, Serialize};

/// Longest username either platform accepts.
pub const MAX_USERNAME_LEN: usize = 50;

/// A chess platform whose public API can confirm that a user exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Lichess,
    ChessCom,
}

impl Platform {
    /// Every supported platform, in a stable order.
    pub const ALL: [Platform; 2] = [Platform::Lichess, Platform::ChessCom];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Lichess => "lichess",
            Platform::ChessCom => "chesscom",
        }
    }

    /// Human readable name for log lines and messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Lichess => "Lichess",
            Platform::ChessCom => "Chess.com",
        }
    }

    /// Public API root used when no override is configured.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Platform::Lichess => "https://lichess.org",
            Platform::ChessCom => "https://api.chess.com",
        }
    }

    /// Path of the public profile endpoint for an already normalized username.
    pub fn profile_path(&self, username: &str) -> String {
        match self {
            Platform::Lichess => format!("/api/user/{}", username),
            Platform::ChessCom => format!("/pub/player/{}", username),
        }
    }

    /// Canonical form of `username` on this platform.
    ///
    /// Chess.com usernames are case-insensitive and the API only answers for
    /// the lowercase form. Lichess keys are kept as typed.
    pub fn normalize_username(&self, username: &str) -> String {
        let trimmed = username.trim();
        match self {
            Platform::Lichess => trimmed.to_string(),
            Platform::ChessCom => trimmed.to_lowercase(),
        }
    }

    /// Check a normalized username against the characters both platforms allow.
    pub fn validate_username(&self, username: &str) -> Result<(), String> {
        if username.is_empty() {
            return Err("username is empty".to_string());
        }
        if username.len() > MAX_USERNAME_LEN {
            return Err(format!(
                "username is longer than {} characters",
                MAX_USERNAME_LEN
            ));
        }
        if let Some(bad) = username
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(format!("username contains invalid character {:?}", bad));
        }
        Ok(())
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lichess" | "lichess.org" => Ok(Platform::Lichess),
            "chesscom" | "chess.com" | "chess_com" | "chess-com" => Ok(Platform::ChessCom),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!("lichess".parse::<Platform>().unwrap(), Platform::Lichess);
        assert_eq!("Chess.com".parse::<Platform>().unwrap(), Platform::ChessCom);
        assert_eq!("chess_com".parse::<Platform>().unwrap(), Platform::ChessCom);
        assert!("fics".parse::<Platform>().is_err());
    }

    #[test]
    fn chesscom_folds_case() {
        assert_eq!(Platform::ChessCom.normalize_username(" Hikaru "), "hikaru");
        assert_eq!(
            Platform::ChessCom.normalize_username("Hikaru"),
            Platform::ChessCom.normalize_username("hikaru")
        );
    }

    #[test]
    fn lichess_keeps_case() {
        assert_eq!(Platform::Lichess.normalize_username(" Hikaru"), "Hikaru");
        assert_ne!(
            Platform::Lichess.normalize_username("Hikaru"),
            Platform::Lichess.normalize_username("hikaru")
        );
    }

    #[test]
    fn profile_paths() {
        assert_eq!(Platform::Lichess.profile_path("DrNykterstein"), "/api/user/DrNykterstein");
        assert_eq!(Platform::ChessCom.profile_path("hikaru"), "/pub/player/hikaru");
    }

    #[test]
    fn rejects_bad_usernames() {
        assert!(Platform::Lichess.validate_username("").is_err());
        assert!(Platform::Lichess.validate_username("a/b").is_err());
        assert!(Platform::ChessCom.validate_username(&"x".repeat(51)).is_err());
        assert!(Platform::ChessCom.validate_username("magnus_carlsen-1").is_ok());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(Platform::ChessCom.as_str(), "chesscom");
        assert_eq!(Platform::Lichess.to_string(), "lichess");
    }
}
