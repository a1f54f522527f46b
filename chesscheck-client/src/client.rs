use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chesscheck_core::{Config, Platform};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info};

use crate::circuit_breaker::CircuitState;
use crate::error::{UpstreamError, ValidationError};
use crate::platform_client::{
    PendingRequests, PlatformClient, PlatformOptions, ResponseCache, ValidationResult,
};
use crate::transport::UserLookup;

/// Point-in-time view of one platform's admission state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformStats {
    pub breaker_state: CircuitState,
    pub failure_count: u32,
    pub token_count: f64,
}

/// Snapshot returned by [`ChessClient::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStats {
    pub cache_size: usize,
    pub pending_count: usize,
    pub platforms: BTreeMap<Platform, PlatformStats>,
}

/// Validates usernames on every supported platform.
///
/// Cache and in-flight table are shared across platforms (keys already
/// include the platform); limiter and breaker are per platform.
#[derive(Debug)]
pub struct ChessClient {
    lichess: PlatformClient,
    chesscom: PlatformClient,
    cache: Arc<ResponseCache>,
    pending: Arc<PendingRequests>,
}

impl ChessClient {
    /// Build HTTP-backed clients for both platforms from configuration.
    pub fn from_config(config: &Config) -> Result<Self, UpstreamError> {
        let cache = Arc::new(ResponseCache::new());
        let pending = Arc::new(PendingRequests::new());
        let lichess =
            PlatformClient::from_config(config, Platform::Lichess, cache.clone(), pending.clone())?;
        let chesscom =
            PlatformClient::from_config(config, Platform::ChessCom, cache.clone(), pending.clone())?;
        info!(
            lichess = config.base_url(Platform::Lichess),
            chesscom = config.base_url(Platform::ChessCom),
            "Chess client ready"
        );
        Ok(Self {
            lichess,
            chesscom,
            cache,
            pending,
        })
    }

    /// Build a client around caller-supplied lookups.
    pub fn with_lookups(
        lichess: (Arc<dyn UserLookup>, PlatformOptions),
        chesscom: (Arc<dyn UserLookup>, PlatformOptions),
    ) -> Self {
        let cache = Arc::new(ResponseCache::new());
        let pending = Arc::new(PendingRequests::new());
        Self {
            lichess: PlatformClient::new(
                Platform::Lichess,
                lichess.0,
                lichess.1,
                cache.clone(),
                pending.clone(),
            ),
            chesscom: PlatformClient::new(
                Platform::ChessCom,
                chesscom.0,
                chesscom.1,
                cache.clone(),
                pending.clone(),
            ),
            cache,
            pending,
        }
    }

    pub fn platform(&self, platform: Platform) -> &PlatformClient {
        match platform {
            Platform::Lichess => &self.lichess,
            Platform::ChessCom => &self.chesscom,
        }
    }

    /// Check whether `username` exists on `platform`.
    pub async fn validate_user(&self, platform: Platform, username: &str) -> ValidationResult {
        self.platform(platform).validate_user(username).await
    }

    /// Drop the cached result for `username`; `true` if a live entry was removed.
    pub async fn invalidate(
        &self,
        platform: Platform,
        username: &str,
    ) -> Result<bool, ValidationError> {
        self.platform(platform).invalidate(username).await
    }

    /// Periodically purge expired cache entries until the handle is aborted.
    pub fn spawn_cache_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.cache.clone();
        // tokio rejects a zero period
        let period = interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let removed = cache.sweep_expired().await;
                if removed > 0 {
                    debug!(removed, "Swept expired cache entries");
                }
            }
        })
    }

    /// Read-only snapshot of cache, coalescing and per-platform admission state.
    pub async fn stats(&self) -> ClientStats {
        let platforms = Platform::ALL
            .into_iter()
            .map(|platform| {
                let client = self.platform(platform);
                (
                    platform,
                    PlatformStats {
                        breaker_state: client.breaker().state(),
                        failure_count: client.breaker().failure_count(),
                        token_count: client.limiter().available(),
                    },
                )
            })
            .collect();

        ClientStats {
            cache_size: self.cache.len().await,
            pending_count: self.pending.pending_count(),
            platforms,
        }
    }
}
