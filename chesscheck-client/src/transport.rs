use std::time::Duration;

use chesscheck_core::Platform;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::UserValidation;
use crate::error::UpstreamError;

/// One upstream existence check, without any resilience around it.
#[async_trait::async_trait]
pub trait UserLookup: Send + Sync {
    async fn lookup(&self, username: &str) -> Result<UserValidation, UpstreamError>;
}

/// Connection settings for one platform's pooled client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub bearer_token: Option<String>,
}

/// Looks users up through the platform's public profile endpoint.
///
/// Holds one long-lived `reqwest::Client`, so connections are pooled and
/// reused across lookups.
#[derive(Debug, Clone)]
pub struct HttpUserLookup {
    platform: Platform,
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserLookup {
    pub fn new(platform: Platform, config: &TransportConfig) -> Result<Self, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = config.bearer_token.as_deref() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| UpstreamError::Client("invalid API token".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| UpstreamError::Client(e.to_string()))?;

        Ok(Self {
            platform,
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn profile_url(&self, username: &str) -> String {
        format!("{}{}", self.base_url, self.platform.profile_path(username))
    }

    fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
        headers
            .get(RETRY_AFTER)
            .and_then(|h| h.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 200;

/// Cut `body` to at most [`MAX_ERROR_BODY`] bytes on a char boundary.
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Fields both platforms return on a profile; only used to confirm the body
/// really is a profile. Closed accounts still count as existing.
#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    id: Option<Value>,
}

#[async_trait::async_trait]
impl UserLookup for HttpUserLookup {
    async fn lookup(&self, username: &str) -> Result<UserValidation, UpstreamError> {
        let url = self.profile_url(username);
        debug!(platform = %self.platform, %url, "Fetching user profile");

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(UserValidation::not_found());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(UpstreamError::RateLimited {
                retry_after: Self::parse_retry_after(response.headers()),
            });
        }

        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Err(UpstreamError::Unavailable {
                status: status.as_u16(),
                retry_after: Self::parse_retry_after(response.headers()),
            });
        }

        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => truncate_body(&body),
                Err(e) => format!("<unreadable body: {}>", e),
            };
            return Err(UpstreamError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let profile: ProfileResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

        if profile.username.is_none() && profile.id.is_none() {
            return Err(UpstreamError::InvalidResponse(
                "profile payload has neither username nor id".to_string(),
            ));
        }

        Ok(UserValidation::found())
    }
}
