//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application.

// Minted event identifiers: <prefix><digest>-<check><suffix>
pub const UID_PREFIX: &str = "busysync-";
pub const UID_SUFFIX: &str = "@busysync.app";
pub const UID_DIGEST_HEX_LEN: usize = 40;
pub const UID_CHECK_HEX_LEN: usize = 8;

// Summary used for events created from ingested busy slots
pub const DEFAULT_EVENT_SUMMARY: &str = "Busy";

// Rate limiting defaults
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;
pub const DEFAULT_MAX_RATE_LIMIT_RETRIES: u32 = 3;

// Token refresh happens this long before expiry
pub const DEFAULT_TOKEN_REFRESH_BUFFER_SECS: i64 = 300;

// Sync pass defaults
pub const DEFAULT_SYNC_CRON: &str = "0 */5 * * * *";
pub const DEFAULT_LOOKAHEAD_DAYS: u32 = 90;
pub const DEFAULT_PUSH_BATCH_SIZE: usize = 25;
pub const DEFAULT_SYNC_RUN_TIMEOUT_SECS: u64 = 600;

// Realtime push channel
pub const EVENT_SYNC_STATUS: &str = "sync:status";
pub const EVENT_PING: &str = "ping";
pub const EVENT_PONG: &str = "pong";
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_BROKER_CHANNEL: &str = "busysync_events";
pub const DEFAULT_BROKER_CAPACITY: usize = 1_024;
pub const USER_ID_HEADER: &str = "x-busysync-user";
