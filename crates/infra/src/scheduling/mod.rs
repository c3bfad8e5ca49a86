//! Cron-based scheduling of sync runs
//!
//! Schedulers have an explicit start/stop lifecycle, track their join
//! handles and wrap every lifecycle call in a timeout.

pub mod error;
pub mod sync_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use sync_scheduler::{
    SyncRunSummary, SyncRunner, SyncScheduler, SyncSchedulerConfig, SyncServiceRunner,
};
