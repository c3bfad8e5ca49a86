//! Per-user sync orchestration

use std::collections::BTreeMap;
use std::sync::Arc;

use busysync_common::resilience::TaskGroup;
use busysync_domain::{BusySyncError, ProviderKind, Result, SyncConfig, SyncResult};
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use super::coordinator::{EpochGuard, SyncCoordinator};
use super::ports::{CanonicalEventSource, StatusSink, SyncStatusRepository};
use super::reporter::StatusReporter;
use crate::calendar::ports::{CalendarDestination, DestinationFactory, DestinationRepository};
use crate::calendar::{sync_provider_accounts, AccountFailure, ProviderSyncReport, SyncWindow};
use crate::realtime::StatusBroadcaster;

/// Per-pass knobs taken from the sync configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub lookahead_days: u32,
    pub push_batch_size: usize,
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self { lookahead_days: config.lookahead_days, push_batch_size: config.push_batch_size }
    }
}

/// Outcome of one user's sync attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSyncReport {
    pub user_id: String,
    pub result: SyncResult,
    pub synced_accounts: usize,
    pub failures: Vec<AccountFailure>,
    /// Set when a newer attempt started before this one finished.
    pub stale: bool,
}

/// Entry point for syncing a user's destinations.
pub struct SyncService {
    coordinator: Arc<SyncCoordinator>,
    destinations: Arc<dyn DestinationRepository>,
    factory: Arc<dyn DestinationFactory>,
    events: Arc<dyn CanonicalEventSource>,
    statuses: Arc<dyn SyncStatusRepository>,
    broadcaster: Arc<StatusBroadcaster>,
    settings: SyncSettings,
}

impl SyncService {
    pub fn new(
        coordinator: Arc<SyncCoordinator>,
        destinations: Arc<dyn DestinationRepository>,
        factory: Arc<dyn DestinationFactory>,
        events: Arc<dyn CanonicalEventSource>,
        statuses: Arc<dyn SyncStatusRepository>,
        broadcaster: Arc<StatusBroadcaster>,
        settings: SyncSettings,
    ) -> Self {
        Self { coordinator, destinations, factory, events, statuses, broadcaster, settings }
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    /// Mirror the user's canonical events to every destination.
    ///
    /// Account failures are returned in the report and logged as errors only
    /// while this attempt is current.
    ///
    /// # Errors
    /// Fails when destinations or events cannot be loaded. A failure from a
    /// superseded attempt is returned as `BusySyncError::StaleAttempt`.
    #[instrument(skip(self))]
    pub async fn sync_user(&self, user_id: &str) -> Result<UserSyncReport> {
        let guard = Arc::new(self.coordinator.begin(user_id));
        let outcome = self.run_attempt(user_id, &guard).await;
        let current = guard.is_current();

        match outcome {
            Ok(mut report) => {
                report.stale = !current;
                for failure in &report.failures {
                    if current {
                        error!(
                            user_id,
                            destination_id = %failure.destination_id,
                            provider = %failure.provider_kind,
                            kind = failure.error.label(),
                            error = %failure.error,
                            "Destination sync failed"
                        );
                    } else {
                        debug!(
                            user_id,
                            destination_id = %failure.destination_id,
                            error = %failure.error,
                            "Destination sync failed in superseded attempt"
                        );
                    }
                }
                info!(
                    user_id,
                    added = report.result.added,
                    removed = report.result.removed,
                    accounts = report.synced_accounts,
                    failed = report.failures.len(),
                    stale = report.stale,
                    "User sync finished"
                );
                Ok(report)
            }
            Err(e) if !current => {
                debug!(user_id, error = %e, "Superseded sync attempt failed");
                Err(BusySyncError::StaleAttempt(e.to_string()))
            }
            Err(e) => {
                error!(user_id, kind = e.label(), error = %e, "User sync failed");
                Err(e)
            }
        }
    }

    /// Sync each user concurrently, returning one outcome per user.
    pub async fn sync_users(
        self: &Arc<Self>,
        user_ids: Vec<String>,
    ) -> Vec<(String, Result<UserSyncReport>)> {
        let mut group = TaskGroup::new();
        for user_id in &user_ids {
            let service = self.clone();
            let user_id = user_id.clone();
            group.spawn(user_id.clone(), async move { service.sync_user(&user_id).await });
        }

        group
            .join_all()
            .await
            .into_iter()
            .map(|outcome| {
                let result = outcome
                    .result
                    .unwrap_or_else(|failure| Err(BusySyncError::Internal(failure.to_string())));
                (outcome.label, result)
            })
            .collect()
    }

    /// Users with at least one destination.
    pub async fn users_with_destinations(&self) -> Result<Vec<String>> {
        self.destinations.list_users().await
    }

    async fn run_attempt(&self, user_id: &str, guard: &Arc<EpochGuard>) -> Result<UserSyncReport> {
        let configs = self.destinations.list_for_user(user_id).await?;
        let mut report = UserSyncReport { user_id: user_id.to_string(), ..UserSyncReport::default() };
        if configs.is_empty() {
            debug!(user_id, "No destinations configured");
            return Ok(report);
        }

        let window = SyncWindow::starting_today(Utc::now(), self.settings.lookahead_days);
        let local_events =
            Arc::new(self.events.list_events(user_id, window.from, window.until).await?);

        let mut by_kind: BTreeMap<ProviderKind, Vec<Arc<dyn CalendarDestination>>> = BTreeMap::new();
        for config in &configs {
            match self.factory.build(config).await {
                Ok(destination) => by_kind.entry(config.provider_kind).or_default().push(destination),
                Err(e) => {
                    warn!(destination_id = %config.destination_id, error = %e, "Could not build destination adapter");
                    report.failures.push(AccountFailure {
                        destination_id: config.destination_id.clone(),
                        provider_kind: config.provider_kind,
                        error: e,
                    });
                }
            }
        }

        let sink: Arc<dyn StatusSink> = Arc::new(StatusReporter::new(
            guard.clone(),
            self.statuses.clone(),
            self.broadcaster.clone(),
        ));

        let mut group = TaskGroup::new();
        let mut kinds = Vec::with_capacity(by_kind.len());
        for (kind, destinations) in by_kind {
            kinds.push((kind, destinations.iter().map(|d| d.destination_id().to_string()).collect::<Vec<_>>()));
            group.spawn(
                kind.as_str(),
                sync_provider_accounts(
                    kind,
                    destinations,
                    local_events.clone(),
                    window,
                    self.settings.push_batch_size,
                    sink.clone(),
                ),
            );
        }

        let mut combined = ProviderSyncReport::default();
        for ((kind, destination_ids), outcome) in kinds.into_iter().zip(group.join_all().await) {
            match outcome.result {
                Ok(provider_report) => combined.merge(provider_report),
                Err(failure) => {
                    combined.failures.extend(destination_ids.into_iter().map(|destination_id| {
                        AccountFailure {
                            destination_id,
                            provider_kind: kind,
                            error: BusySyncError::Internal(failure.to_string()),
                        }
                    }));
                }
            }
        }

        report.result = combined.result;
        report.synced_accounts = combined.synced_accounts;
        report.failures.extend(combined.failures);
        Ok(report)
    }
}
