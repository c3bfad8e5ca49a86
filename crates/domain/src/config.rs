//! Application configuration structures
//!
//! Every section carries defaults so a partial file (or no file at all) is a
//! valid configuration. Loading lives in `busysync-infra::config`.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BROKER_CAPACITY, DEFAULT_BROKER_CHANNEL,
    DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_LOOKAHEAD_DAYS, DEFAULT_MAX_BACKOFF_MS,
    DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_MAX_RATE_LIMIT_RETRIES, DEFAULT_PING_INTERVAL_SECS,
    DEFAULT_PUSH_BATCH_SIZE, DEFAULT_SYNC_CRON, DEFAULT_SYNC_RUN_TIMEOUT_SECS,
    DEFAULT_TOKEN_REFRESH_BUFFER_SECS,
};

/// Root configuration, one section per subsystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub rate_limit: RateLimitConfig,
    pub tokens: TokenConfig,
    pub oauth: OAuthConfig,
    pub realtime: RealtimeConfig,
    pub security: SecurityConfig,
}

/// SQLite file and connection pool size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "busysync.db".to_string(), pool_size: 8 }
    }
}

/// Scheduled sync and reconciliation pass settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    /// Six-field cron expression (seconds first).
    pub cron: String,
    /// How far ahead of today events are mirrored.
    pub lookahead_days: u32,
    pub push_batch_size: usize,
    pub run_timeout_secs: u64,
    /// Users synced by the scheduler. Empty means every user with a
    /// destination.
    pub users: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: DEFAULT_SYNC_CRON.to_string(),
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            push_batch_size: DEFAULT_PUSH_BATCH_SIZE,
            run_timeout_secs: DEFAULT_SYNC_RUN_TIMEOUT_SECS,
            users: Vec::new(),
        }
    }
}

/// Per-destination limiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_concurrent: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: u32,
    /// Attempts after a rate limit signal before the call is recorded as
    /// failed.
    pub max_retries: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_REQUESTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
        }
    }
}

/// OAuth token maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub refresh_buffer_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self { refresh_buffer_secs: DEFAULT_TOKEN_REFRESH_BUFFER_SECS }
    }
}

/// OAuth client registrations per provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub google: OAuthClientConfig,
    pub microsoft: OAuthClientConfig,
}

/// OAuth client registration. Endpoint overrides fall back to the
/// provider's public endpoints when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: Option<String>,
    pub api_base_url: Option<String>,
}

/// WebSocket server and broker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub bind_addr: String,
    pub ping_interval_secs: u64,
    pub broker: BrokerConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            broker: BrokerConfig::default(),
        }
    }
}

/// Pub/sub backend shared by server processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrokerConfig {
    /// Single-process broadcast channel.
    InMemory {
        #[serde(default = "default_broker_capacity")]
        capacity: usize,
    },
    /// PostgreSQL `LISTEN`/`NOTIFY`.
    Postgres {
        url: String,
        #[serde(default = "default_broker_channel")]
        channel: String,
    },
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::InMemory { capacity: DEFAULT_BROKER_CAPACITY }
    }
}

const fn default_broker_capacity() -> usize {
    DEFAULT_BROKER_CAPACITY
}

fn default_broker_channel() -> String {
    DEFAULT_BROKER_CHANNEL.to_string()
}

/// Secrets used to read stored credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Base64 encoded 32-byte key used to decrypt stored CalDAV passwords.
    pub secret_key: Option<String>,
}
