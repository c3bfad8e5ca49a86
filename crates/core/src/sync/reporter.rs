//! Status reporting for one sync attempt
//!
//! Writes go through the user's reporting lock and are dropped once the
//! attempt is superseded, so a stale attempt never overwrites the stored
//! row or the live view of a newer one.

use std::sync::Arc;

use async_trait::async_trait;
use busysync_domain::SyncStatus;
use tracing::{debug, error, warn};

use super::coordinator::EpochGuard;
use super::ports::{StatusSink, SyncStatusRepository};
use crate::realtime::StatusBroadcaster;

/// [`StatusSink`] that persists and broadcasts statuses while its attempt
/// is current.
pub struct StatusReporter {
    guard: Arc<EpochGuard>,
    statuses: Arc<dyn SyncStatusRepository>,
    broadcaster: Arc<StatusBroadcaster>,
}

impl StatusReporter {
    pub fn new(
        guard: Arc<EpochGuard>,
        statuses: Arc<dyn SyncStatusRepository>,
        broadcaster: Arc<StatusBroadcaster>,
    ) -> Self {
        Self { guard, statuses, broadcaster }
    }
}

#[async_trait]
impl StatusSink for StatusReporter {
    async fn publish(&self, status: SyncStatus) {
        let Some(epoch) = self.guard.epoch() else {
            return;
        };
        let coordinator = self.guard.coordinator();
        let Some(lock) = coordinator.reporting_lock(epoch) else {
            return;
        };
        let _reporting = lock.lock().await;

        let user_id = epoch.user_id();
        if !coordinator.is_current(epoch) {
            debug!(
                user_id,
                destination_id = %status.destination_id,
                "Skipping status from superseded sync attempt"
            );
            return;
        }

        if let Err(e) = self.statuses.upsert(user_id, &status).await {
            error!(user_id, destination_id = %status.destination_id, error = %e, "Failed to persist sync status");
        }
        if let Err(e) = self.broadcaster.emit_status(user_id, &status).await {
            warn!(user_id, destination_id = %status.destination_id, error = %e, "Failed to broadcast sync status");
        }
    }
}
