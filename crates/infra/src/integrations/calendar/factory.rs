//! Builds destination adapters from stored configuration

use std::sync::Arc;

use async_trait::async_trait;
use busysync_common::SecretCipher;
use busysync_core::{CalendarDestination, DestinationFactory, TokenRefresher};
use busysync_domain::{
    BusySyncError, CalDavProfile, Credentials, DestinationConfig, OAuthConfig, ProviderKind, Result,
};
use tracing::debug;

use super::providers::caldav::CalDavLogin;
use super::providers::{CalDavDestination, GoogleCalendarDestination, MicrosoftCalendarDestination};
use crate::errors::InfraError;
use crate::http::{HttpClient, RateLimiterRegistry};

/// Builds the adapter matching a destination's provider kind.
pub struct ProviderDestinationFactory {
    http: HttpClient,
    limiters: Arc<RateLimiterRegistry>,
    tokens: Arc<TokenRefresher>,
    cipher: Option<Arc<SecretCipher>>,
    google_api_base: Option<String>,
    microsoft_api_base: Option<String>,
}

impl ProviderDestinationFactory {
    pub fn new(
        http: HttpClient,
        limiters: Arc<RateLimiterRegistry>,
        tokens: Arc<TokenRefresher>,
        cipher: Option<Arc<SecretCipher>>,
    ) -> Self {
        Self { http, limiters, tokens, cipher, google_api_base: None, microsoft_api_base: None }
    }

    /// Apply API root overrides from the OAuth settings.
    #[must_use]
    pub fn with_oauth_config(mut self, oauth: &OAuthConfig) -> Self {
        self.google_api_base = oauth.google.api_base_url.clone();
        self.microsoft_api_base = oauth.microsoft.api_base_url.clone();
        self
    }

    fn decrypt_password(&self, destination_id: &str, encrypted: &str) -> Result<String> {
        let cipher = self.cipher.as_ref().ok_or_else(|| {
            BusySyncError::Config(format!(
                "security.secret_key is required to use CalDAV destination {destination_id}"
            ))
        })?;
        Ok(cipher.decrypt_to_string(encrypted).map_err(InfraError::from)?)
    }
}

#[async_trait]
impl DestinationFactory for ProviderDestinationFactory {
    async fn build(&self, config: &DestinationConfig) -> Result<Arc<dyn CalendarDestination>> {
        let limiter = self.limiters.limiter_for(&config.destination_id)?;
        debug!(destination_id = %config.destination_id, provider = %config.provider_kind, "Building destination adapter");

        match config.provider_kind {
            ProviderKind::Google => {
                let mut adapter = GoogleCalendarDestination::new(
                    config,
                    self.tokens.clone(),
                    self.http.clone(),
                    limiter,
                )?;
                if let Some(base) = &self.google_api_base {
                    adapter = adapter.with_api_base(base.as_str());
                }
                Ok(Arc::new(adapter))
            }
            ProviderKind::Microsoft => {
                let mut adapter = MicrosoftCalendarDestination::new(
                    config,
                    self.tokens.clone(),
                    self.http.clone(),
                    limiter,
                )?;
                if let Some(base) = &self.microsoft_api_base {
                    adapter = adapter.with_api_base(base.as_str());
                }
                Ok(Arc::new(adapter))
            }
            kind => {
                let profile = CalDavProfile::for_kind(kind).ok_or_else(|| {
                    BusySyncError::Internal(format!("no CalDAV profile for {kind}"))
                })?;
                let Credentials::CalDav { calendar_url, username, encrypted_password } =
                    &config.credentials
                else {
                    return Err(BusySyncError::Validation(format!(
                        "{kind} destination {} has OAuth credentials",
                        config.destination_id
                    )));
                };

                let login = CalDavLogin {
                    username: username.clone(),
                    password: self.decrypt_password(&config.destination_id, encrypted_password)?,
                };
                Ok(Arc::new(CalDavDestination::new(
                    config.destination_id.clone(),
                    config.user_id.clone(),
                    profile,
                    calendar_url,
                    login,
                    self.http.clone(),
                    limiter,
                )?))
            }
        }
    }
}
