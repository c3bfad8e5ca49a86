//! Tracing subscriber setup
//!
//! Filtering follows `RUST_LOG` and defaults to `info`.

use busysync_domain::{BusySyncError, Result};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// `json` selects JSON lines; anything else is human readable.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Build the filter from `RUST_LOG`, falling back to `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// # Errors
/// Returns `BusySyncError::Internal` when a global subscriber is already set.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let builder = fmt().with_env_filter(env_filter()).with_target(true);
    let installed = match format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    installed.map_err(|e| BusySyncError::Internal(format!("failed to install tracing subscriber: {e}")))
}
