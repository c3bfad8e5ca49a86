//! SQLite persistence behind the core ports

pub mod destination_repository;
pub mod event_repository;
pub mod manager;
pub mod sync_status_repository;

pub use destination_repository::SqliteDestinationRepository;
pub use event_repository::SqliteEventRepository;
pub use manager::{DbConnection, DbManager};
pub use sync_status_repository::SqliteSyncStatusRepository;
