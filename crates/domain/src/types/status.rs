//! Per-destination sync status, persisted and pushed to live connections

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// Coarse state shown to observers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
}

impl_domain_status_conversions!(SyncState {
    Idle => "idle",
    Syncing => "syncing",
});

/// Phase of a running pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStage {
    Fetching,
    Comparing,
    Processing,
}

impl_domain_status_conversions!(SyncStage {
    Fetching => "fetching",
    Comparing => "comparing",
    Processing => "processing",
});

/// Kind of the last applied change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Add,
    Remove,
}

impl_domain_status_conversions!(OperationKind {
    Add => "add",
    Remove => "remove",
});

/// Changes applied so far out of the diff's total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub current: usize,
    pub total: usize,
}

/// Most recent successful change and the start time of its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastOperation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub event_time: DateTime<Utc>,
}

/// Status of one destination as seen by observers.
///
/// Keyed by `(user_id, destination_id)` in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub destination_id: String,
    pub status: SyncState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<SyncStage>,
    pub local_event_count: usize,
    pub remote_event_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<SyncProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<LastOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    pub in_sync: bool,
}

impl SyncStatus {
    /// Idle status with no counts, before any pass has run.
    pub fn idle(destination_id: impl Into<String>) -> Self {
        Self {
            destination_id: destination_id.into(),
            status: SyncState::Idle,
            stage: None,
            local_event_count: 0,
            remote_event_count: 0,
            progress: None,
            last_operation: None,
            last_synced_at: None,
            in_sync: false,
        }
    }

    /// Syncing status at `stage` with no progress yet.
    pub fn syncing(
        destination_id: impl Into<String>,
        stage: SyncStage,
        local_event_count: usize,
        remote_event_count: usize,
    ) -> Self {
        Self {
            status: SyncState::Syncing,
            stage: Some(stage),
            local_event_count,
            remote_event_count,
            ..Self::idle(destination_id)
        }
    }

    /// Terminal status after a completed pass. `in_sync` is decided by the
    /// pass, since counts alone cannot tell duplicates from drift.
    pub fn completed(
        destination_id: impl Into<String>,
        local_event_count: usize,
        remote_event_count: usize,
        in_sync: bool,
        synced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            local_event_count,
            remote_event_count,
            last_synced_at: Some(synced_at),
            in_sync,
            ..Self::idle(destination_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn serializes_wire_shape() {
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let mut status = SyncStatus::syncing("dest-1", SyncStage::Processing, 3, 1);
        status.progress = Some(SyncProgress { current: 1, total: 2 });
        status.last_operation = Some(LastOperation { kind: OperationKind::Add, event_time: at });

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["destinationId"], "dest-1");
        assert_eq!(json["status"], "syncing");
        assert_eq!(json["stage"], "processing");
        assert_eq!(json["localEventCount"], 3);
        assert_eq!(json["progress"]["total"], 2);
        assert_eq!(json["lastOperation"]["type"], "add");
        assert_eq!(json["inSync"], false);
        assert!(json.get("lastSyncedAt").is_none());
    }

    #[test]
    fn completed_status_carries_pass_verdict() {
        let now = Utc::now();
        let done = SyncStatus::completed("d", 4, 3, true, now);
        assert!(done.in_sync);
        assert_eq!((done.local_event_count, done.remote_event_count), (4, 3));
        assert_eq!(done.last_synced_at, Some(now));
        assert!(!SyncStatus::completed("d", 4, 4, false, now).in_sync);
        assert_eq!(SyncStatus::completed("d", 0, 0, true, now).status, SyncState::Idle);
    }
}
