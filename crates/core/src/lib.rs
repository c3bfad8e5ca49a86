//! # BusySync Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Event identity minting and the two diff algorithms
//! - Port/adapter interfaces (traits) for destinations, storage and brokers
//! - Sync orchestration, epoch coordination and token refresh
//! - Status fan-out to live push connections
//!
//! ## Architecture Principles
//! - Only depends on `busysync-common` and `busysync-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod auth;
pub mod calendar;
pub mod diff;
pub mod identity;
pub mod ingestion;
pub mod realtime;
pub mod sync;

// Re-export specific items to avoid ambiguity
pub use auth::ports::{OAuthTokenClient, TokenStore};
pub use auth::TokenRefresher;
pub use calendar::ports::{
    CalendarDestination, DestinationFactory, DestinationRepository, ListOptions,
};
pub use calendar::{
    sync_destination, sync_provider_accounts, AccountFailure, ProviderSyncReport, SyncWindow,
};
pub use diff::{diff_by_identity, diff_slots, IdentityDiff, SlotDiff};
pub use identity::{generate_uid, is_owned_identifier};
pub use ingestion::ports::SlotRepository;
pub use ingestion::{IngestionResult, IngestionService, SourceRef};
pub use realtime::ports::{BrokerSubscription, MessageBroker};
pub use realtime::{
    ConnectionId, ConnectionRegistry, ConnectionSender, FanoutSubscriber, StatusBroadcaster,
};
pub use sync::ports::{CanonicalEventSource, StatusSink, SyncStatusRepository};
pub use sync::{
    EpochGuard, StatusReporter, SyncCoordinator, SyncEpoch, SyncService, SyncSettings,
    UserSyncReport,
};
