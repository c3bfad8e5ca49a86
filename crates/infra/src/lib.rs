//! # BusySync Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - SQLite repositories (r2d2 pool, `spawn_blocking` access)
//! - The shared HTTP client with rate limit detection
//! - Google, Microsoft Graph and CalDAV destination adapters
//! - Message brokers and the WebSocket push endpoint
//! - The cron sync scheduler, config loader and tracing setup
//!
//! ## Architecture
//! - Implements traits defined in `busysync-core`
//! - Contains all "impure" code (I/O, network, storage)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod observability;
pub mod realtime;
pub mod scheduling;

// Re-export commonly used items
pub use database::{
    DbManager, SqliteDestinationRepository, SqliteEventRepository, SqliteSyncStatusRepository,
};
pub use errors::InfraError;
pub use http::{HttpClient, RateLimiterRegistry};
pub use integrations::calendar::{ProviderDestinationFactory, RefreshTokenClient};
pub use realtime::{connect_broker, InMemoryBroker, PostgresBroker};
pub use scheduling::{SyncScheduler, SyncSchedulerConfig, SyncServiceRunner};
