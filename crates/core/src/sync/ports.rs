//! Port interfaces for sync orchestration

use async_trait::async_trait;
use busysync_domain::{CanonicalEvent, Result, SyncStatus};
use chrono::{DateTime, Utc};

/// Receives status updates during a destination pass.
///
/// Publishing never fails the pass; implementations log their own errors.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish(&self, status: SyncStatus);
}

/// Persisted per-destination status rows keyed by `(user_id, destination_id)`.
#[async_trait]
pub trait SyncStatusRepository: Send + Sync {
    /// Insert or replace the row for `(user_id, status.destination_id)`.
    async fn upsert(&self, user_id: &str, status: &SyncStatus) -> Result<()>;

    async fn get(&self, user_id: &str, destination_id: &str) -> Result<Option<SyncStatus>>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<SyncStatus>>;
}

/// Canonical events produced by ingestion.
#[async_trait]
pub trait CanonicalEventSource: Send + Sync {
    /// Events for `user_id` overlapping `[from, until)`.
    async fn list_events(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CanonicalEvent>>;
}
