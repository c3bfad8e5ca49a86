//! Periodic sync runs driven by a cron expression.
//!
//! Each tick runs [`SyncRunner::run`] for the configured users, or for every
//! user with a destination when none are configured. A run that exceeds
//! `run_timeout` is abandoned and logged; the next tick starts fresh.
//! Stopping the scheduler cancels a run that is still in flight.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use busysync_core::SyncService;
//! use busysync_domain::SyncConfig;
//! use busysync_infra::scheduling::{
//!     SchedulerResult, SyncScheduler, SyncSchedulerConfig, SyncServiceRunner,
//! };
//!
//! # async fn example(service: Arc<SyncService>) -> SchedulerResult<()> {
//! let runner = Arc::new(SyncServiceRunner::new(service));
//! let mut scheduler =
//!     SyncScheduler::new(SyncSchedulerConfig::from(&SyncConfig::default()), runner);
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use busysync_core::SyncService;
use busysync_domain::{Result, SyncConfig};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Schedule and lifecycle bounds for [`SyncScheduler`].
#[derive(Debug, Clone)]
pub struct SyncSchedulerConfig {
    /// Six-field cron expression, seconds first.
    pub cron_expression: String,
    /// Users to sync. Empty means every user with a destination.
    pub users: Vec<String>,
    /// Timeout applied to a single run.
    pub run_timeout: Duration,
    /// Bound on starting the underlying job scheduler.
    pub start_timeout: Duration,
    /// Bound on shutting it down.
    pub stop_timeout: Duration,
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncSchedulerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            cron_expression: config.cron.clone(),
            users: config.users.clone(),
            run_timeout: Duration::from_secs(config.run_timeout_secs),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Counts from one scheduled run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncRunSummary {
    /// Users attempted.
    pub users: usize,
    pub succeeded: usize,
    /// Users with an account failure or a failed attempt.
    pub failed: usize,
    /// Users whose attempt was superseded while it ran.
    pub stale: usize,
}

/// Work performed on every scheduler tick.
#[async_trait]
pub trait SyncRunner: Send + Sync {
    /// Sync `users`, or every user with a destination when empty.
    async fn run(&self, users: &[String]) -> Result<SyncRunSummary>;
}

/// [`SyncRunner`] backed by the sync service.
pub struct SyncServiceRunner {
    service: Arc<SyncService>,
}

impl SyncServiceRunner {
    pub fn new(service: Arc<SyncService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl SyncRunner for SyncServiceRunner {
    async fn run(&self, users: &[String]) -> Result<SyncRunSummary> {
        let users = if users.is_empty() {
            self.service.users_with_destinations().await?
        } else {
            users.to_vec()
        };

        let mut summary = SyncRunSummary { users: users.len(), ..SyncRunSummary::default() };
        for (user_id, outcome) in self.service.sync_users(users).await {
            match outcome {
                Ok(report) if report.stale => summary.stale += 1,
                Ok(report) if report.failures.is_empty() => summary.succeeded += 1,
                Ok(report) => {
                    summary.failed += 1;
                    debug!(user_id = %user_id, failures = report.failures.len(), "Sync run had account failures");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(user_id = %user_id, error = %e, "Sync run failed for user");
                }
            }
        }
        Ok(summary)
    }
}

/// Cron scheduler with explicit lifecycle management.
pub struct SyncScheduler {
    scheduler: Option<JobScheduler>,
    config: SyncSchedulerConfig,
    runner: Arc<dyn SyncRunner>,
    cancellation: CancellationToken,
}

impl SyncScheduler {
    pub fn new(config: SyncSchedulerConfig, runner: Arc<dyn SyncRunner>) -> Self {
        Self {
            scheduler: None,
            config,
            runner,
            cancellation: CancellationToken::new(),
        }
    }

    /// Register the cron job and start ticking.
    #[instrument(skip(self), fields(cron = %self.config.cron_expression))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler_instance = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;

        tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|source| SchedulerError::Timeout { duration: start_timeout, source })?
            .map_err(|source| SchedulerError::StartFailed { source })?;

        self.scheduler = Some(scheduler_instance);
        info!("Sync scheduler started");
        Ok(())
    }

    /// Cancel any in-flight run and shut the job scheduler down.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        let Some(mut scheduler) = self.scheduler.take() else {
            return Err(SchedulerError::NotRunning);
        };

        self.cancellation.cancel();

        let stop_timeout = self.config.stop_timeout;
        tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
            .await
            .map_err(|source| SchedulerError::Timeout { duration: stop_timeout, source })?
            .map_err(|source| SchedulerError::StopFailed { source })?;

        info!("Sync scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|source| SchedulerError::CreationFailed { source })?;

        let runner = Arc::clone(&self.runner);
        let users = Arc::new(self.config.users.clone());
        let run_timeout = self.config.run_timeout;
        let cancel = self.cancellation.clone();

        let job = Job::new_async(self.config.cron_expression.as_str(), move |_id, _lock| {
            let runner = Arc::clone(&runner);
            let users = Arc::clone(&users);
            let cancel = cancel.clone();

            Box::pin(async move {
                if cancel.is_cancelled() {
                    return;
                }
                run_once(runner.as_ref(), &users, run_timeout, &cancel).await;
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        let job_id = job.guid();
        scheduler
            .add(job)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        debug!(cron = %self.config.cron_expression, job_id = %job_id, "Registered sync job");
        Ok(scheduler)
    }
}

/// One scheduled run, bounded by `run_timeout` and abandoned once `cancel`
/// fires. Outcomes are only logged.
async fn run_once(
    runner: &dyn SyncRunner,
    users: &[String],
    run_timeout: Duration,
    cancel: &CancellationToken,
) {
    let started = Instant::now();
    let outcome = tokio::select! {
        () = cancel.cancelled() => {
            info!(elapsed_ms = started.elapsed().as_millis(), "Scheduled sync cancelled by shutdown");
            return;
        }
        outcome = tokio::time::timeout(run_timeout, runner.run(users)) => outcome,
    };
    match outcome {
        Ok(Ok(summary)) => info!(
            users = summary.users,
            succeeded = summary.succeeded,
            failed = summary.failed,
            stale = summary.stale,
            elapsed_ms = started.elapsed().as_millis(),
            "Scheduled sync finished"
        ),
        Ok(Err(e)) => error!(error = %e, "Scheduled sync failed"),
        Err(_) => warn!(timeout_secs = run_timeout.as_secs(), "Scheduled sync timed out"),
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}
