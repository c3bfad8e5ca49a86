//! Keeps destination access tokens valid ahead of expiry
//!
//! The refresher remembers the latest token per destination so adapters that
//! still hold the account as loaded at the start of a pass do not refresh
//! twice. Refreshes for one destination are serialized.

use std::collections::HashMap;
use std::sync::Arc;

use busysync_domain::{BusySyncError, OAuthAccount, ProviderKind, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::ports::{OAuthTokenClient, TokenStore};

type AccountSlot = Arc<Mutex<Option<OAuthAccount>>>;

/// Refreshes OAuth access tokens and persists the result.
pub struct TokenRefresher {
    clients: HashMap<ProviderKind, Arc<dyn OAuthTokenClient>>,
    store: Arc<dyn TokenStore>,
    refresh_buffer_secs: i64,
    accounts: Mutex<HashMap<String, AccountSlot>>,
}

impl TokenRefresher {
    pub fn new(store: Arc<dyn TokenStore>, refresh_buffer_secs: i64) -> Self {
        Self { clients: HashMap::new(), store, refresh_buffer_secs, accounts: Mutex::new(HashMap::new()) }
    }

    /// Register the token client used for `kind`.
    #[must_use]
    pub fn with_client(mut self, kind: ProviderKind, client: Arc<dyn OAuthTokenClient>) -> Self {
        self.clients.insert(kind, client);
        self
    }

    /// Return an access token valid for at least the refresh buffer.
    ///
    /// # Errors
    /// Returns `BusySyncError::Auth` when no client is registered for the
    /// account's provider or the refresh exchange fails, and the store's
    /// error when the new token cannot be persisted.
    #[instrument(skip(self, account), fields(destination_id = %account.destination_id, provider = %account.provider_kind))]
    pub async fn ensure_valid(&self, account: &OAuthAccount) -> Result<String> {
        let slot = self.slot_for(&account.destination_id).await;
        let mut cached = slot.lock().await;

        let current = match cached.as_ref() {
            Some(known) if known.expires_at >= account.expires_at => known.clone(),
            _ => account.clone(),
        };

        if !current.needs_refresh(Utc::now(), self.refresh_buffer_secs) {
            debug!(expires_at = %current.expires_at, "Access token still valid");
            let token = current.access_token.clone();
            *cached = Some(current);
            return Ok(token);
        }

        let client = self.clients.get(&current.provider_kind).ok_or_else(|| {
            BusySyncError::Auth(format!("No token client for provider {}", current.provider_kind))
        })?;

        let refreshed = client.refresh(&current.refresh_token).await.map_err(|e| {
            warn!(error = %e, "Token refresh failed");
            match e {
                BusySyncError::Auth(message) => BusySyncError::Auth(message),
                other => BusySyncError::Auth(format!("Token refresh failed: {other}")),
            }
        })?;

        self.store.save_token(&current.destination_id, &refreshed).await?;
        info!(expires_at = %refreshed.expires_at, "Access token refreshed");

        let token = refreshed.access_token.clone();
        *cached = Some(OAuthAccount {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token.unwrap_or(current.refresh_token),
            expires_at: refreshed.expires_at,
            ..current
        });
        Ok(token)
    }

    /// Drop the remembered token for a destination.
    pub async fn forget(&self, destination_id: &str) {
        self.accounts.lock().await.remove(destination_id);
    }

    async fn slot_for(&self, destination_id: &str) -> AccountSlot {
        self.accounts.lock().await.entry(destination_id.to_string()).or_default().clone()
    }
}
