//! Refresh-token exchange for OAuth calendar providers

use std::sync::Arc;

use async_trait::async_trait;
use busysync_common::RateLimiter;
use busysync_core::OAuthTokenClient;
use busysync_domain::{BusySyncError, OAuthClientConfig, RefreshedToken, Result};
use chrono::{Duration, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::instrument;

use crate::http::HttpClient;

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const MICROSOFT_SCOPES: &str = "offline_access https://graph.microsoft.com/Calendars.ReadWrite";

/// `refresh_token` grant against a provider token endpoint.
pub struct RefreshTokenClient {
    provider: &'static str,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: Option<&'static str>,
    http: HttpClient,
    limiter: Arc<RateLimiter>,
}

impl RefreshTokenClient {
    pub fn google(config: &OAuthClientConfig, http: HttpClient) -> Self {
        Self::build("google", GOOGLE_TOKEN_URL, None, config, http)
    }

    pub fn microsoft(config: &OAuthClientConfig, http: HttpClient) -> Self {
        Self::build("microsoft", MICROSOFT_TOKEN_URL, Some(MICROSOFT_SCOPES), config, http)
    }

    fn build(
        provider: &'static str,
        default_url: &str,
        scope: Option<&'static str>,
        config: &OAuthClientConfig,
        http: HttpClient,
    ) -> Self {
        Self {
            provider,
            token_url: config.token_url.clone().unwrap_or_else(|| default_url.to_string()),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope,
            http,
            limiter: Arc::new(RateLimiter::with_defaults()),
        }
    }
}

#[async_trait]
impl OAuthTokenClient for RefreshTokenClient {
    #[instrument(skip(self, refresh_token), fields(provider = self.provider))]
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken> {
        if self.client_id.is_empty() {
            return Err(BusySyncError::Auth(format!("{} OAuth client is not configured", self.provider)));
        }

        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        if let Some(scope) = self.scope {
            form.push(("scope", scope));
        }

        let request = self.http.request(Method::POST, &self.token_url).form(&form);
        let response = self.http.send(&self.limiter, request).await?;
        if !response.is_success() {
            return Err(BusySyncError::Auth(format!(
                "Token refresh failed ({}): {}",
                response.status,
                response.body.chars().take(200).collect::<String>()
            )));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| BusySyncError::Auth(format!("Failed to parse token response: {e}")))?;

        Ok(RefreshedToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}
