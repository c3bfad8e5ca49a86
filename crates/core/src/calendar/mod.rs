//! Destination calendars: the adapter contract, the shared reconciliation
//! pass, and multi-account fan-out.

pub mod fanout;
pub mod ports;
pub mod sync;

pub use fanout::{sync_provider_accounts, AccountFailure, ProviderSyncReport};
pub use sync::{sync_destination, SyncWindow};
