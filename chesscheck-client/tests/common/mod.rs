//! Shared helpers for tests that run the client against a local mock server.

#![allow(dead_code)]

use chesscheck_client::ChessClient;
use chesscheck_core::{Config, PlatformSettings, Secrets, Settings};
use serde_json::{Value, json};
use wiremock::MockServer;

/// Point both platforms at `server`, with backoff short enough for real-time tests.
pub fn settings_for(server: &MockServer) -> Settings {
    let mut settings = Settings::default();
    for tuning in [
        &mut settings.platforms.lichess,
        &mut settings.platforms.chesscom,
    ] {
        fast(tuning, &server.uri());
    }
    settings
}

fn fast(tuning: &mut PlatformSettings, base_url: &str) {
    tuning.base_url = Some(base_url.to_string());
    tuning.connect_timeout_seconds = 1;
    tuning.request_timeout_seconds = 1;
    tuning.backoff_base_ms = 10;
    tuning.backoff_max_ms = 50;
    tuning.rate_limit.capacity = 20;
    tuning.rate_limit.refill_per_second = 20.0;
}

pub fn client_with(settings: Settings) -> ChessClient {
    let config = Config::new(settings, Secrets::default()).unwrap();
    ChessClient::from_config(&config).unwrap()
}

pub fn client_for(server: &MockServer) -> ChessClient {
    client_with(settings_for(server))
}

pub fn lichess_profile(username: &str) -> Value {
    json!({
        "id": username.to_lowercase(),
        "username": username,
        "perfs": { "blitz": { "games": 1200, "rating": 2310 } },
        "createdAt": 1_290_415_680_000u64
    })
}

pub fn chesscom_profile(username: &str) -> Value {
    json!({
        "player_id": 15448422,
        "@id": format!("https://api.chess.com/pub/player/{}", username),
        "username": username,
        "followers": 1000,
        "status": "premium"
    })
}
