//! Shared reconciliation pass, identical for every destination adapter

use busysync_domain::{
    CanonicalEvent, LastOperation, OperationKind, Result, SyncProgress, SyncResult, SyncStage,
    SyncStatus,
};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use super::ports::{CalendarDestination, ListOptions};
use crate::diff::diff_by_identity;
use crate::sync::ports::StatusSink;

/// Time range mirrored to destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    /// Inclusive lower bound, midnight UTC of the first day.
    pub from: DateTime<Utc>,
    /// Exclusive upper bound.
    pub until: DateTime<Utc>,
}

impl SyncWindow {
    /// From the start of `now`'s UTC day through `lookahead_days` later.
    pub fn starting_today(now: DateTime<Utc>, lookahead_days: u32) -> Self {
        let from = now.date_naive().and_time(chrono::NaiveTime::default()).and_utc();
        Self { from, until: from + Duration::days(i64::from(lookahead_days)) }
    }

    /// Overlap test, matching how destinations filter listings.
    pub fn contains(&self, event: &CanonicalEvent) -> bool {
        event.end_time > self.from && event.start_time < self.until
    }

    /// Listing bounds handed to destinations.
    pub const fn list_options(&self) -> ListOptions {
        ListOptions { from: self.from, until: self.until }
    }
}

struct PassStatus<'a> {
    destination_id: &'a str,
    local_count: usize,
    remote_count: usize,
    total: usize,
    done: usize,
    last_operation: Option<LastOperation>,
}

impl PassStatus<'_> {
    fn stage(&self, stage: SyncStage) -> SyncStatus {
        let mut status =
            SyncStatus::syncing(self.destination_id, stage, self.local_count, self.remote_count);
        if stage == SyncStage::Processing {
            status.progress = Some(SyncProgress { current: self.done, total: self.total });
            status.last_operation = self.last_operation;
        }
        status
    }

    fn record(&mut self, kind: OperationKind, event_time: DateTime<Utc>) {
        self.last_operation = Some(LastOperation { kind, event_time });
    }
}

/// Reconcile one destination with `local_events`.
///
/// Additions are applied before removals, in chunks of `batch_size`. Each
/// primitive is called at least once for a non-empty diff, so an empty
/// removal set still reaches `delete_events`. Per-event failures, including
/// events the adapter returned no result for, are logged and left out of the
/// counts, and the final status reports the destination out of sync.
///
/// # Errors
/// Returns the adapter's error when listing, pushing or deleting fails at the
/// account level, and a validation error for malformed local events.
#[instrument(skip_all, fields(destination_id = destination.destination_id(), provider = %destination.provider_kind()))]
pub async fn sync_destination(
    destination: &dyn CalendarDestination,
    local_events: &[CanonicalEvent],
    window: SyncWindow,
    batch_size: usize,
    sink: &dyn StatusSink,
) -> Result<SyncResult> {
    let local: Vec<CanonicalEvent> =
        local_events.iter().filter(|event| window.contains(event)).cloned().collect();
    let mut pass = PassStatus {
        destination_id: destination.destination_id(),
        local_count: local.len(),
        remote_count: 0,
        total: 0,
        done: 0,
        last_operation: None,
    };

    sink.publish(pass.stage(SyncStage::Fetching)).await;
    let remote = destination.list_remote_events(window.list_options()).await?;
    pass.remote_count = remote.len();

    sink.publish(pass.stage(SyncStage::Comparing)).await;
    let diff = diff_by_identity(destination.user_id(), &local, &remote)?;
    pass.local_count = diff.local_identifiers;
    pass.remote_count = diff.remote_identifiers;

    if diff.is_empty() {
        debug!(events = pass.local_count, "Destination already in sync");
        sink.publish(SyncStatus::completed(
            pass.destination_id,
            pass.local_count,
            pass.remote_count,
            true,
            Utc::now(),
        ))
        .await;
        return Ok(SyncResult::default());
    }

    pass.total = diff.total();
    sink.publish(pass.stage(SyncStage::Processing)).await;

    let batch_size = batch_size.max(1);
    let mut added = 0;
    let mut failed = 0;
    let add_batches: Vec<&[CanonicalEvent]> =
        if diff.to_add.is_empty() { vec![&[]] } else { diff.to_add.chunks(batch_size).collect() };
    for batch in add_batches {
        let results = destination.push_events(batch).await?;
        failed += missing_results("push", batch.len(), results.len());
        for (event, result) in batch.iter().zip(&results) {
            if result.success {
                added += 1;
                pass.record(OperationKind::Add, event.start_time);
            } else {
                failed += 1;
                warn!(
                    event_id = %event.id,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Failed to push event"
                );
            }
        }
        pass.done += batch.len();
        if !batch.is_empty() {
            sink.publish(pass.stage(SyncStage::Processing)).await;
        }
    }

    let removal_times: std::collections::HashMap<&str, DateTime<Utc>> =
        remote.iter().map(|event| (event.uid.as_str(), event.start_time)).collect();
    let mut removed = 0;
    let remove_batches: Vec<&[String]> = if diff.to_remove.is_empty() {
        vec![&[]]
    } else {
        diff.to_remove.chunks(batch_size).collect()
    };
    for batch in remove_batches {
        let results = destination.delete_events(batch).await?;
        failed += missing_results("delete", batch.len(), results.len());
        for (uid, result) in batch.iter().zip(&results) {
            if result.success {
                removed += 1;
                if let Some(event_time) = removal_times.get(uid.as_str()) {
                    pass.record(OperationKind::Remove, *event_time);
                }
            } else {
                failed += 1;
                warn!(
                    uid = %uid,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Failed to delete event"
                );
            }
        }
        pass.done += batch.len();
        if !batch.is_empty() {
            sink.publish(pass.stage(SyncStage::Processing)).await;
        }
    }

    let remote_count = (pass.remote_count + added).saturating_sub(removed);
    sink.publish(SyncStatus::completed(
        pass.destination_id,
        pass.local_count,
        remote_count,
        failed == 0,
        Utc::now(),
    ))
    .await;

    info!(added, removed, failed, local = pass.local_count, remote = remote_count, "Destination sync complete");
    Ok(SyncResult::new(added, removed))
}

/// Events an adapter returned no result for. Each counts as failed.
fn missing_results(operation: &str, expected: usize, returned: usize) -> usize {
    let missing = expected.saturating_sub(returned);
    if missing > 0 {
        warn!(operation, expected, returned, "Adapter returned fewer results than events");
    }
    missing
}
