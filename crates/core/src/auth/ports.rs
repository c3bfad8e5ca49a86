//! Port interfaces for OAuth token maintenance

use async_trait::async_trait;
use busysync_domain::{RefreshedToken, Result};

/// Provider-specific refresh-token exchange.
#[async_trait]
pub trait OAuthTokenClient: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken>;
}

/// Persists refreshed tokens for a destination account.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save_token(&self, destination_id: &str, token: &RefreshedToken) -> Result<()>;
}
