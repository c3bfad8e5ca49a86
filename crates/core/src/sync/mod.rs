//! Sync orchestration: epochs, status reporting and the per-user service.

pub mod coordinator;
pub mod ports;
pub mod reporter;
pub mod service;

pub use coordinator::{EpochGuard, SyncCoordinator, SyncEpoch};
pub use reporter::StatusReporter;
pub use service::{SyncService, SyncSettings, UserSyncReport};
