//! Concurrent sync of several accounts of one provider kind

use std::sync::Arc;

use busysync_common::resilience::TaskGroup;
use busysync_domain::{BusySyncError, CanonicalEvent, ProviderKind, Result, SyncResult};
use tracing::{info, instrument};

use super::ports::CalendarDestination;
use super::sync::{sync_destination, SyncWindow};
use crate::sync::ports::StatusSink;

/// One account whose pass did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFailure {
    pub destination_id: String,
    pub provider_kind: ProviderKind,
    pub error: BusySyncError,
}

/// Summed results of every account of one kind, plus failed accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderSyncReport {
    pub result: SyncResult,
    pub synced_accounts: usize,
    pub failures: Vec<AccountFailure>,
}

impl ProviderSyncReport {
    /// Add `other`'s counts and failures to this report.
    pub fn merge(&mut self, other: Self) {
        self.result += other.result;
        self.synced_accounts += other.synced_accounts;
        self.failures.extend(other.failures);
    }
}

/// Run [`sync_destination`] for every account concurrently.
///
/// Each account's failure, including a panic inside its adapter, is
/// recorded without affecting the others.
#[instrument(skip_all, fields(provider = %kind, accounts = destinations.len()))]
pub async fn sync_provider_accounts(
    kind: ProviderKind,
    destinations: Vec<Arc<dyn CalendarDestination>>,
    local_events: Arc<Vec<CanonicalEvent>>,
    window: SyncWindow,
    batch_size: usize,
    sink: Arc<dyn StatusSink>,
) -> ProviderSyncReport {
    let mut group = TaskGroup::new();
    for destination in destinations {
        let local_events = local_events.clone();
        let sink = sink.clone();
        group.spawn(destination.destination_id().to_string(), async move {
            sync_destination(destination.as_ref(), &local_events, window, batch_size, sink.as_ref())
                .await
        });
    }

    let mut report = ProviderSyncReport::default();
    for outcome in group.join_all().await {
        let result: Result<SyncResult> = outcome
            .result
            .unwrap_or_else(|failure| Err(BusySyncError::Internal(failure.to_string())));
        match result {
            Ok(result) => {
                report.result += result;
                report.synced_accounts += 1;
            }
            Err(error) => report.failures.push(AccountFailure {
                destination_id: outcome.label,
                provider_kind: kind,
                error,
            }),
        }
    }

    info!(
        added = report.result.added,
        removed = report.result.removed,
        failed = report.failures.len(),
        "Provider accounts synced"
    );
    report
}
