//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. If `BUSYSYNC_DB_PATH` is set, the configuration comes from the
//!    environment, layered over defaults
//! 2. Otherwise the first config file found by [`probe_config_paths`] is used
//! 3. With neither, defaults apply
//!
//! The result is checked by [`validate`] before it is returned.
//!
//! ## Environment Variables
//! - `BUSYSYNC_DB_PATH`, `BUSYSYNC_DB_POOL_SIZE`
//! - `BUSYSYNC_SYNC_ENABLED`, `BUSYSYNC_SYNC_CRON`, `BUSYSYNC_SYNC_LOOKAHEAD_DAYS`,
//!   `BUSYSYNC_SYNC_USERS` (comma separated)
//! - `BUSYSYNC_MAX_CONCURRENT_REQUESTS`
//! - `BUSYSYNC_BIND_ADDR`, `BUSYSYNC_PING_INTERVAL_SECS`
//! - `BUSYSYNC_BROKER_URL`, `BUSYSYNC_BROKER_CHANNEL` (PostgreSQL broker when
//!   the URL is set)
//! - `BUSYSYNC_SECRET_KEY`
//! - `BUSYSYNC_GOOGLE_CLIENT_ID`, `BUSYSYNC_GOOGLE_CLIENT_SECRET`
//! - `BUSYSYNC_MICROSOFT_CLIENT_ID`, `BUSYSYNC_MICROSOFT_CLIENT_SECRET`
//!
//! ## File Locations
//! `busysync.toml`, `busysync.json`, `config.toml` and `config.json` in the
//! working directory, its two parents, then next to the executable.

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use busysync_common::SecretCipher;
use busysync_domain::constants::DEFAULT_BROKER_CHANNEL;
use busysync_domain::{BrokerConfig, BusySyncError, Config, Result};

const CONFIG_FILE_NAMES: [&str; 4] = ["busysync.toml", "busysync.json", "config.toml", "config.json"];

/// Load and validate configuration using the strategy above.
///
/// # Errors
/// Returns `BusySyncError::Config` when a source is malformed or the
/// resulting configuration is invalid.
pub fn load() -> Result<Config> {
    let config = if std::env::var_os("BUSYSYNC_DB_PATH").is_some() {
        let config = load_from_env()?;
        tracing::info!("Configuration loaded from environment variables");
        config
    } else if let Some(path) = probe_config_paths() {
        load_from_file(Some(path))?
    } else {
        tracing::warn!("No configuration found, using defaults");
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

/// Load configuration from `BUSYSYNC_*` environment variables.
///
/// `BUSYSYNC_DB_PATH` is required; every other variable falls back to the
/// default for its field.
///
/// # Errors
/// Returns `BusySyncError::Config` if `BUSYSYNC_DB_PATH` is missing or a
/// variable cannot be parsed.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.database.path = env_var("BUSYSYNC_DB_PATH")?;
    config.database.pool_size = env_parse("BUSYSYNC_DB_POOL_SIZE", config.database.pool_size)?;

    config.sync.enabled = env_bool("BUSYSYNC_SYNC_ENABLED", config.sync.enabled);
    if let Ok(cron) = std::env::var("BUSYSYNC_SYNC_CRON") {
        config.sync.cron = cron;
    }
    config.sync.lookahead_days =
        env_parse("BUSYSYNC_SYNC_LOOKAHEAD_DAYS", config.sync.lookahead_days)?;
    if let Ok(users) = std::env::var("BUSYSYNC_SYNC_USERS") {
        config.sync.users = users
            .split(',')
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(ToString::to_string)
            .collect();
    }

    config.rate_limit.max_concurrent =
        env_parse("BUSYSYNC_MAX_CONCURRENT_REQUESTS", config.rate_limit.max_concurrent)?;

    if let Ok(bind_addr) = std::env::var("BUSYSYNC_BIND_ADDR") {
        config.realtime.bind_addr = bind_addr;
    }
    config.realtime.ping_interval_secs =
        env_parse("BUSYSYNC_PING_INTERVAL_SECS", config.realtime.ping_interval_secs)?;
    if let Ok(url) = std::env::var("BUSYSYNC_BROKER_URL") {
        let channel = std::env::var("BUSYSYNC_BROKER_CHANNEL")
            .unwrap_or_else(|_| DEFAULT_BROKER_CHANNEL.to_string());
        config.realtime.broker = BrokerConfig::Postgres { url, channel };
    }

    config.security.secret_key = std::env::var("BUSYSYNC_SECRET_KEY").ok();

    if let Ok(id) = std::env::var("BUSYSYNC_GOOGLE_CLIENT_ID") {
        config.oauth.google.client_id = id;
    }
    if let Ok(secret) = std::env::var("BUSYSYNC_GOOGLE_CLIENT_SECRET") {
        config.oauth.google.client_secret = secret;
    }
    if let Ok(id) = std::env::var("BUSYSYNC_MICROSOFT_CLIENT_ID") {
        config.oauth.microsoft.client_id = id;
    }
    if let Ok(secret) = std::env::var("BUSYSYNC_MICROSOFT_CLIENT_SECRET") {
        config.oauth.microsoft.client_secret = secret;
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is chosen by
/// extension (`.toml` or `.json`).
///
/// # Errors
/// Returns `BusySyncError::Config` if the file is missing, unreadable or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(BusySyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            BusySyncError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| BusySyncError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| BusySyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| BusySyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(BusySyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file in the standard locations, if any.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.extend(cwd.ancestors().take(3).map(Path::to_path_buf));
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// Reject configurations the server cannot run with.
///
/// # Errors
/// Returns `BusySyncError::Config` naming the first offending field.
pub fn validate(config: &Config) -> Result<()> {
    fn ensure(ok: bool, message: &str) -> Result<()> {
        if ok {
            Ok(())
        } else {
            Err(BusySyncError::Config(message.to_string()))
        }
    }

    ensure(!config.database.path.trim().is_empty(), "database.path must not be empty")?;
    ensure(config.database.pool_size > 0, "database.pool_size must be at least 1")?;

    ensure(!config.sync.cron.trim().is_empty(), "sync.cron must not be empty")?;
    ensure(config.sync.lookahead_days > 0, "sync.lookahead_days must be at least 1")?;
    ensure(config.sync.push_batch_size > 0, "sync.push_batch_size must be at least 1")?;
    ensure(config.sync.run_timeout_secs > 0, "sync.run_timeout_secs must be at least 1")?;

    let limits = &config.rate_limit;
    ensure(limits.max_concurrent > 0, "rate_limit.max_concurrent must be at least 1")?;
    ensure(limits.initial_backoff_ms > 0, "rate_limit.initial_backoff_ms must be positive")?;
    ensure(
        limits.max_backoff_ms >= limits.initial_backoff_ms,
        "rate_limit.max_backoff_ms must not be below initial_backoff_ms",
    )?;
    ensure(limits.multiplier >= 1, "rate_limit.multiplier must be at least 1")?;

    ensure(config.tokens.refresh_buffer_secs >= 0, "tokens.refresh_buffer_secs must not be negative")?;

    ensure(config.realtime.ping_interval_secs > 0, "realtime.ping_interval_secs must be at least 1")?;
    config.realtime.bind_addr.parse::<SocketAddr>().map_err(|e| {
        BusySyncError::Config(format!("realtime.bind_addr {:?}: {e}", config.realtime.bind_addr))
    })?;
    if let BrokerConfig::Postgres { url, .. } = &config.realtime.broker {
        ensure(!url.trim().is_empty(), "realtime.broker.url must not be empty")?;
    }

    if let Some(key) = &config.security.secret_key {
        SecretCipher::from_base64_key(key)
            .map_err(|e| BusySyncError::Config(format!("security.secret_key: {e}")))?;
    }

    Ok(())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        BusySyncError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Parse `key` if set, else `default`.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| BusySyncError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use once_cell::sync::Lazy;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ENV_KEYS: [&str; 12] = [
        "BUSYSYNC_DB_PATH",
        "BUSYSYNC_DB_POOL_SIZE",
        "BUSYSYNC_SYNC_ENABLED",
        "BUSYSYNC_SYNC_USERS",
        "BUSYSYNC_SYNC_LOOKAHEAD_DAYS",
        "BUSYSYNC_BIND_ADDR",
        "BUSYSYNC_BROKER_URL",
        "BUSYSYNC_BROKER_CHANNEL",
        "BUSYSYNC_SECRET_KEY",
        "BUSYSYNC_GOOGLE_CLIENT_ID",
        "BUSYSYNC_PING_INTERVAL_SECS",
        "BUSYSYNC_MAX_CONCURRENT_REQUESTS",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        for value in ["1", "true", "yes", "on", "TRUE"] {
            std::env::set_var("BUSYSYNC_TEST_BOOL", value);
            assert!(env_bool("BUSYSYNC_TEST_BOOL", false), "{value} should be true");
        }
        for value in ["0", "false", "no", "off"] {
            std::env::set_var("BUSYSYNC_TEST_BOOL", value);
            assert!(!env_bool("BUSYSYNC_TEST_BOOL", true), "{value} should be false");
        }

        std::env::remove_var("BUSYSYNC_TEST_BOOL");
        assert!(env_bool("BUSYSYNC_TEST_BOOL", true));
        assert!(!env_bool("BUSYSYNC_TEST_BOOL", false));
    }

    #[test]
    fn test_load_from_env_layers_over_defaults() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("BUSYSYNC_DB_PATH", "/tmp/busysync-test.db");
        std::env::set_var("BUSYSYNC_DB_POOL_SIZE", "3");
        std::env::set_var("BUSYSYNC_SYNC_ENABLED", "false");
        std::env::set_var("BUSYSYNC_SYNC_USERS", "alice, bob,,");
        std::env::set_var("BUSYSYNC_BROKER_URL", "postgres://localhost/busysync");
        std::env::set_var("BUSYSYNC_GOOGLE_CLIENT_ID", "google-client");

        let config = load_from_env().expect("config from env");
        clear_env();

        assert_eq!(config.database.path, "/tmp/busysync-test.db");
        assert_eq!(config.database.pool_size, 3);
        assert!(!config.sync.enabled);
        assert_eq!(config.sync.users, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(
            config.realtime.broker,
            BrokerConfig::Postgres {
                url: "postgres://localhost/busysync".to_string(),
                channel: DEFAULT_BROKER_CHANNEL.to_string(),
            }
        );
        assert_eq!(config.oauth.google.client_id, "google-client");
        assert_eq!(config.sync.lookahead_days, Config::default().sync.lookahead_days);
        assert_eq!(config.rate_limit, Config::default().rate_limit);
    }

    #[test]
    fn test_load_from_env_missing_db_path() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let err = load_from_env().expect_err("db path is required");
        assert!(matches!(err, BusySyncError::Config(_)));
    }

    #[test]
    fn test_load_from_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("BUSYSYNC_DB_PATH", "/tmp/busysync-test.db");
        std::env::set_var("BUSYSYNC_PING_INTERVAL_SECS", "soon");

        let result = load_from_env();
        clear_env();

        let err = result.expect_err("invalid interval");
        assert!(err.to_string().contains("BUSYSYNC_PING_INTERVAL_SECS"));
    }

    #[test]
    fn test_parse_config_by_extension() {
        let toml_content = r#"
[database]
path = "test.db"

[sync]
users = ["alice"]
"#;
        let config = parse_config(toml_content, Path::new("busysync.toml")).expect("valid TOML");
        assert_eq!(config.database.path, "test.db");
        assert_eq!(config.sync.users, vec!["alice".to_string()]);

        let json_content = r#"{ "realtime": { "ping_interval_secs": 5 } }"#;
        let config = parse_config(json_content, Path::new("busysync.json")).expect("valid JSON");
        assert_eq!(config.realtime.ping_interval_secs, 5);

        assert!(parse_config("a: b", Path::new("busysync.yaml")).is_err());
        assert!(parse_config("{ not json", Path::new("busysync.json")).is_err());
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/busysync.toml")));
        assert!(matches!(result, Err(BusySyncError::Config(_))));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        validate(&Config::default()).expect("defaults are valid");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.rate_limit.max_concurrent = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.realtime.ping_interval_secs = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.realtime.bind_addr = "not-an-address".to_string();
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.rate_limit.max_backoff_ms = config.rate_limit.initial_backoff_ms - 1;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.security.secret_key = Some("too-short".to_string());
        assert!(validate(&config).is_err());
    }
}
