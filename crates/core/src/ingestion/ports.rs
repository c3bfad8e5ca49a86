//! Storage boundary for pull-in ingestion

use async_trait::async_trait;
use busysync_domain::{CanonicalEvent, Result, StoredSlot};

/// Stored canonical events of one source, viewed as time slots.
#[async_trait]
pub trait SlotRepository: Send + Sync {
    /// Stored slots for one source, in insertion order.
    async fn list_slots(&self, user_id: &str, source_id: &str) -> Result<Vec<StoredSlot>>;

    /// Insert `additions` and delete rows by id in one transaction.
    async fn apply_changes(
        &self,
        user_id: &str,
        additions: &[CanonicalEvent],
        removals: &[String],
    ) -> Result<()>;
}
