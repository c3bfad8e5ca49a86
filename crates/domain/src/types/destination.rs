//! Destination accounts and their credentials

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{BusySyncError, Result};
use crate::impl_domain_status_conversions;

/// Kind of calendar a destination account lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Microsoft,
    #[serde(rename = "icloud")]
    ICloud,
    Fastmail,
    Nextcloud,
    #[serde(rename = "caldav")]
    CalDav,
}

impl_domain_status_conversions!(ProviderKind {
    Google => "google",
    Microsoft => "microsoft",
    ICloud => "icloud",
    Fastmail => "fastmail",
    Nextcloud => "nextcloud",
    CalDav => "caldav",
});

impl ProviderKind {
    pub const fn is_oauth(self) -> bool {
        matches!(self, Self::Google | Self::Microsoft)
    }

    pub const fn is_caldav(self) -> bool {
        !self.is_oauth()
    }
}

/// Vendor parameters for the generic CalDAV adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalDavProfile {
    pub kind: ProviderKind,
    pub display_name: &'static str,
    /// Base URL for relative calendar paths. `None` means accounts must
    /// store an absolute calendar URL.
    pub server_url: Option<&'static str>,
}

impl CalDavProfile {
    /// Profile for a CalDAV-family kind, `None` for OAuth kinds.
    pub const fn for_kind(kind: ProviderKind) -> Option<Self> {
        let (display_name, server_url) = match kind {
            ProviderKind::ICloud => ("iCloud", Some("https://caldav.icloud.com")),
            ProviderKind::Fastmail => ("Fastmail", Some("https://caldav.fastmail.com")),
            ProviderKind::Nextcloud => ("Nextcloud", None),
            ProviderKind::CalDav => ("CalDAV", None),
            ProviderKind::Google | ProviderKind::Microsoft => return None,
        };
        Some(Self { kind, display_name, server_url })
    }

    /// Resolve an account's calendar location to an absolute collection URL
    /// ending in `/`.
    ///
    /// # Errors
    /// Returns `BusySyncError::Validation` when the location is relative and
    /// the profile has no server URL.
    pub fn resolve_calendar_url(&self, calendar_url: &str) -> Result<String> {
        let trimmed = calendar_url.trim();
        if trimmed.is_empty() {
            return Err(BusySyncError::Validation(format!(
                "{} account has no calendar URL",
                self.display_name
            )));
        }

        let absolute = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            let base = self.server_url.ok_or_else(|| {
                BusySyncError::Validation(format!(
                    "{} calendar URL must be absolute: {trimmed}",
                    self.display_name
                ))
            })?;
            format!("{}/{}", base.trim_end_matches('/'), trimmed.trim_start_matches('/'))
        };

        if absolute.ends_with('/') {
            Ok(absolute)
        } else {
            Ok(format!("{absolute}/"))
        }
    }
}

/// Credentials, shaped by provider kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Credentials {
    #[serde(rename = "oauth")]
    OAuth {
        access_token: String,
        refresh_token: String,
        expires_at: DateTime<Utc>,
        #[serde(default = "default_calendar_id")]
        calendar_id: String,
    },
    #[serde(rename = "caldav")]
    CalDav {
        calendar_url: String,
        username: String,
        /// AES-GCM ciphertext, base64 encoded.
        encrypted_password: String,
    },
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

/// A destination account events are mirrored to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationConfig {
    pub destination_id: String,
    pub user_id: String,
    pub provider_kind: ProviderKind,
    pub credentials: Credentials,
}

impl DestinationConfig {
    /// OAuth token view of this destination, if it uses OAuth credentials.
    pub fn oauth_account(&self) -> Option<OAuthAccount> {
        match &self.credentials {
            Credentials::OAuth { access_token, refresh_token, expires_at, .. } => {
                Some(OAuthAccount {
                    destination_id: self.destination_id.clone(),
                    provider_kind: self.provider_kind,
                    access_token: access_token.clone(),
                    refresh_token: refresh_token.clone(),
                    expires_at: *expires_at,
                })
            }
            Credentials::CalDav { .. } => None,
        }
    }
}

/// OAuth token state for one destination account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthAccount {
    pub destination_id: String,
    pub provider_kind: ProviderKind,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl OAuthAccount {
    /// True when the token expires within `buffer_secs` of `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, buffer_secs: i64) -> bool {
        self.expires_at <= now + chrono::Duration::seconds(buffer_secs)
    }
}

/// Result of a refresh-token exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Present when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}
