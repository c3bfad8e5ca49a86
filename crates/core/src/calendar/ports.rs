//! Destination calendar port interfaces
//!
//! One [`CalendarDestination`] exists per linked account. Account-level
//! failures (token refresh, listing) come back as `Err`; per-event failures
//! are reported inside the returned result vectors.

use std::sync::Arc;

use async_trait::async_trait;
use busysync_domain::{
    CanonicalEvent, DeleteResult, DestinationConfig, ProviderKind, PushResult, RemoteEvent, Result,
};
use chrono::{DateTime, Utc};

/// Bounds for listing remote events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Lower bound, normally the start of today.
    pub from: DateTime<Utc>,
    /// Exclusive upper bound.
    pub until: DateTime<Utc>,
}

/// Adapter contract for one destination account.
#[async_trait]
pub trait CalendarDestination: Send + Sync {
    fn destination_id(&self) -> &str;

    /// User whose identifiers this adapter mints.
    fn user_id(&self) -> &str;

    fn provider_kind(&self) -> ProviderKind;

    /// Create or update each event, keyed by its minted identifier.
    async fn push_events(&self, events: &[CanonicalEvent]) -> Result<Vec<PushResult>>;

    /// Delete events by minted identifier. Already-absent events succeed.
    async fn delete_events(&self, uids: &[String]) -> Result<Vec<DeleteResult>>;

    /// Owned events between `options.from` and `options.until`.
    async fn list_remote_events(&self, options: ListOptions) -> Result<Vec<RemoteEvent>>;
}

/// Builds adapters from stored destination configuration.
#[async_trait]
pub trait DestinationFactory: Send + Sync {
    async fn build(&self, config: &DestinationConfig) -> Result<Arc<dyn CalendarDestination>>;
}

/// Stored destination accounts.
#[async_trait]
pub trait DestinationRepository: Send + Sync {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<DestinationConfig>>;

    /// Users with at least one destination.
    async fn list_users(&self) -> Result<Vec<String>>;

    async fn save(&self, config: &DestinationConfig) -> Result<()>;
}
