//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for BusySync
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum BusySyncError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection or API failure. Recorded per event or per account.
    #[error("Network error: {0}")]
    Network(String),

    /// The destination signalled a rate limit.
    #[error("Rate limited: {message}")]
    RateLimited { message: String, retry_after_secs: Option<u64> },

    /// Token expired, revoked, or the refresh exchange failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Failure raised by a sync attempt that has since been superseded.
    #[error("Stale sync attempt: {0}")]
    StaleAttempt(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BusySyncError {
    /// Shorthand for a rate limit error without a server hint.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited { message: message.into(), retry_after_secs: None }
    }

    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// `Retry-After` hint carried by a rate limit error, if any.
    pub const fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs, .. } => *retry_after_secs,
            _ => None,
        }
    }

    /// Stable label used as a structured log field.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Config(_) => "config",
            Self::Network(_) => "network",
            Self::RateLimited { .. } => "rate_limited",
            Self::Auth(_) => "auth",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::StaleAttempt(_) => "stale_attempt",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias for BusySync operations
pub type Result<T> = std::result::Result<T, BusySyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_carries_retry_hint() {
        let err = BusySyncError::RateLimited {
            message: "slow down".to_string(),
            retry_after_secs: Some(30),
        };
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after_secs(), Some(30));
        assert_eq!(err.label(), "rate_limited");
        assert_eq!(err.to_string(), "Rate limited: slow down");
    }

    #[test]
    fn other_variants_have_no_retry_hint() {
        let err = BusySyncError::Network("connection reset".to_string());
        assert!(!err.is_rate_limited());
        assert_eq!(err.retry_after_secs(), None);
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(BusySyncError::Auth("revoked".to_string())).unwrap();
        assert_eq!(json["type"], "Auth");
        assert_eq!(json["message"], "revoked");

        let json = serde_json::to_value(BusySyncError::rate_limited("quota")).unwrap();
        assert_eq!(json["type"], "RateLimited");
        assert_eq!(json["message"]["message"], "quota");
    }
}
