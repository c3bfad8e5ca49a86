//! OAuth token maintenance for destination accounts.

pub mod ports;
pub mod token_refresher;

pub use token_refresher::TokenRefresher;
