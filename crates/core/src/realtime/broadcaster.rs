//! Publishes user-scoped events on the broker channel

use std::sync::Arc;

use busysync_domain::constants::EVENT_SYNC_STATUS;
use busysync_domain::{BroadcastMessage, BusySyncError, Result, SyncStatus};
use serde::Serialize;
use tracing::trace;

use super::ports::MessageBroker;

/// Publishes realtime events through the message broker.
pub struct StatusBroadcaster {
    broker: Arc<dyn MessageBroker>,
}

impl StatusBroadcaster {
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self { broker }
    }

    /// Publish `{userId, event, data}` for every process to fan out.
    ///
    /// # Errors
    /// Returns `BusySyncError::Validation` when `data` cannot be serialized
    /// and the broker's error when publishing fails.
    pub async fn emit<T: Serialize + ?Sized + Sync>(
        &self,
        user_id: &str,
        event: &str,
        data: &T,
    ) -> Result<()> {
        let data = serde_json::to_value(data)
            .map_err(|e| BusySyncError::Validation(format!("Unserializable event data: {e}")))?;
        let message = BroadcastMessage { user_id: user_id.to_string(), event: event.to_string(), data };
        let payload = serde_json::to_string(&message)
            .map_err(|e| BusySyncError::Internal(format!("Failed to encode broadcast: {e}")))?;

        trace!(user_id, event, "Emitting broadcast");
        self.broker.publish(payload).await
    }

    /// Publish a `sync:status` event for `status`.
    pub async fn emit_status(&self, user_id: &str, status: &SyncStatus) -> Result<()> {
        self.emit(user_id, EVENT_SYNC_STATUS, status).await
    }
}
