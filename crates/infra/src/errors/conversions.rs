//! Conversions from external infrastructure errors into domain errors.

use busysync_common::CommonError;
use busysync_domain::BusySyncError;
use r2d2::Error as PoolError;
use reqwest::{Error as HttpError, StatusCode};
use rusqlite::Error as SqlError;
use serde_json::Error as JsonError;
use tokio_postgres::Error as PgError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub BusySyncError);

impl From<InfraError> for BusySyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<BusySyncError> for InfraError {
    fn from(value: BusySyncError) -> Self {
        Self(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoBusySyncError {
    fn into_busysync(self) -> BusySyncError;
}

/// Map a non-success HTTP status to the domain taxonomy.
///
/// `detail` is the (possibly truncated) response body, kept for logs.
pub fn classify_status(status: StatusCode, detail: &str) -> BusySyncError {
    let code = status.as_u16();
    let mut message = format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));
    let detail = detail.trim();
    if !detail.is_empty() {
        message.push_str(": ");
        message.extend(detail.chars().take(300));
    }

    match code {
        401 | 403 => BusySyncError::Auth(message),
        404 | 410 => BusySyncError::NotFound(message),
        429 => BusySyncError::rate_limited(message),
        400..=499 => BusySyncError::Validation(message),
        _ => BusySyncError::Network(message),
    }
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → BusySyncError */
/* -------------------------------------------------------------------------- */

impl IntoBusySyncError for SqlError {
    fn into_busysync(self) -> BusySyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        BusySyncError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        BusySyncError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        BusySyncError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        BusySyncError::Database("foreign key constraint violation".into())
                    }
                    _ => BusySyncError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => BusySyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                BusySyncError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                BusySyncError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => BusySyncError::Database("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidPath(path) => BusySyncError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => BusySyncError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        Self(value.into_busysync())
    }
}

impl From<PoolError> for InfraError {
    fn from(value: PoolError) -> Self {
        Self(BusySyncError::Database(format!("connection pool error: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → BusySyncError */
/* -------------------------------------------------------------------------- */

impl IntoBusySyncError for HttpError {
    fn into_busysync(self) -> BusySyncError {
        if self.is_timeout() {
            return BusySyncError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return BusySyncError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            return classify_status(status, "");
        }

        if self.is_decode() {
            return BusySyncError::Validation(format!("unexpected response body: {self}"));
        }

        BusySyncError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        Self(value.into_busysync())
    }
}

/* -------------------------------------------------------------------------- */
/* Remaining sources */
/* -------------------------------------------------------------------------- */

impl From<PgError> for InfraError {
    fn from(value: PgError) -> Self {
        Self(BusySyncError::Network(format!("postgres broker error: {value}")))
    }
}

impl From<JsonError> for InfraError {
    fn from(value: JsonError) -> Self {
        Self(BusySyncError::Validation(format!("invalid JSON: {value}")))
    }
}

impl From<CommonError> for InfraError {
    fn from(value: CommonError) -> Self {
        let message = value.to_string();
        Self(match value {
            CommonError::Config { .. } => BusySyncError::Config(message),
            CommonError::Validation { .. } | CommonError::Crypto(_) => {
                BusySyncError::Validation(message)
            }
            CommonError::Internal(_) => BusySyncError::Internal(message),
        })
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
