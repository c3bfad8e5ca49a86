//! Domain types and models

pub mod destination;
pub mod event;
pub mod realtime;
pub mod status;

pub use destination::{CalDavProfile, Credentials, DestinationConfig, OAuthAccount, ProviderKind, RefreshedToken};
pub use event::{CanonicalEvent, DeleteResult, EventTimeSlot, PushResult, RemoteEvent, StoredSlot, SyncResult};
pub use realtime::{BroadcastMessage, PushMessage};
pub use status::{LastOperation, OperationKind, SyncProgress, SyncStage, SyncState, SyncStatus};
