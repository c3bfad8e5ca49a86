//! Common error type for the shared utility crate
//!
//! Callers in other crates convert `CommonError` into their own error type at
//! the boundary; nothing here depends on the domain crate.

use thiserror::Error;

/// Errors raised by the shared utilities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommonError {
    /// Configuration-related errors
    #[error("Configuration error in field '{field}': {message}")]
    Config { field: String, message: String },

    /// Input failed validation
    #[error("Validation error in field '{field}': {message}")]
    Validation { field: String, message: String },

    /// Encryption or decryption failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommonError {
    pub fn config<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Config { field: field.into(), message: message.into() }
    }

    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    pub fn crypto<S: Into<String>>(message: S) -> Self {
        Self::Crypto(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

pub type CommonResult<T> = Result<T, CommonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_field() {
        let err = CommonError::config("max_concurrent", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "Configuration error in field 'max_concurrent': must be greater than 0"
        );
    }
}
