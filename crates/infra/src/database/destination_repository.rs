//! SQLite-backed destination accounts and OAuth token persistence.

use std::sync::Arc;

use async_trait::async_trait;
use busysync_core::{DestinationRepository, TokenStore};
use busysync_domain::{
    BusySyncError, Credentials, DestinationConfig, ProviderKind, RefreshedToken, Result,
};
use rusqlite::{params, OptionalExtension, Row};
use tokio::task;
use tracing::{debug, instrument};

use super::manager::{map_join_error, DbManager};
use crate::errors::InfraError;

/// Destination configs and their OAuth tokens in SQLite.
pub struct SqliteDestinationRepository {
    db: Arc<DbManager>,
}

impl SqliteDestinationRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Look up one destination by id.
    pub async fn find(&self, destination_id: &str) -> Result<Option<DestinationConfig>> {
        let db = Arc::clone(&self.db);
        let destination_id = destination_id.to_string();

        task::spawn_blocking(move || -> Result<Option<DestinationConfig>> {
            let conn = db.get_connection()?;
            let raw = conn
                .query_row(
                    "SELECT destination_id, user_id, provider_kind, credentials
                     FROM destinations WHERE destination_id = ?1",
                    params![destination_id],
                    read_raw,
                )
                .optional()
                .map_err(InfraError::from)?;
            raw.map(RawDestination::into_config).transpose()
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl DestinationRepository for SqliteDestinationRepository {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<DestinationConfig>> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();

        task::spawn_blocking(move || -> Result<Vec<DestinationConfig>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT destination_id, user_id, provider_kind, credentials
                     FROM destinations WHERE user_id = ?1 ORDER BY created_at, destination_id",
                )
                .map_err(InfraError::from)?;
            let rows = stmt
                .query_map(params![user_id], read_raw)
                .map_err(InfraError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(InfraError::from)?;
            rows.into_iter().map(RawDestination::into_config).collect()
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_users(&self) -> Result<Vec<String>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<String>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare("SELECT DISTINCT user_id FROM destinations ORDER BY user_id")
                .map_err(InfraError::from)?;
            let users = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(InfraError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(InfraError::from)?;
            Ok(users)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, config), fields(destination_id = %config.destination_id, provider = %config.provider_kind))]
    async fn save(&self, config: &DestinationConfig) -> Result<()> {
        let db = Arc::clone(&self.db);
        let config = config.clone();
        let credentials = serde_json::to_string(&config.credentials).map_err(InfraError::from)?;

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let now = chrono::Utc::now().timestamp();
            conn.execute(
                "INSERT INTO destinations
                    (destination_id, user_id, provider_kind, credentials, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(destination_id) DO UPDATE SET
                    user_id = excluded.user_id,
                    provider_kind = excluded.provider_kind,
                    credentials = excluded.credentials,
                    updated_at = excluded.updated_at",
                params![
                    config.destination_id,
                    config.user_id,
                    config.provider_kind.as_str(),
                    credentials,
                    now
                ],
            )
            .map_err(InfraError::from)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl TokenStore for SqliteDestinationRepository {
    #[instrument(skip(self, token))]
    async fn save_token(&self, destination_id: &str, token: &RefreshedToken) -> Result<()> {
        let db = Arc::clone(&self.db);
        let destination_id = destination_id.to_string();
        let token = token.clone();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(InfraError::from)?;

            let stored: Option<String> = tx
                .query_row(
                    "SELECT credentials FROM destinations WHERE destination_id = ?1",
                    params![destination_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(InfraError::from)?;
            let stored = stored.ok_or_else(|| {
                BusySyncError::NotFound(format!("destination {destination_id}"))
            })?;

            let mut credentials: Credentials =
                serde_json::from_str(&stored).map_err(InfraError::from)?;
            let Credentials::OAuth { access_token, refresh_token, expires_at, .. } =
                &mut credentials
            else {
                return Err(BusySyncError::Validation(format!(
                    "destination {destination_id} does not use OAuth"
                )));
            };
            access_token.clone_from(&token.access_token);
            if let Some(rotated) = &token.refresh_token {
                refresh_token.clone_from(rotated);
            }
            *expires_at = token.expires_at;

            let updated = serde_json::to_string(&credentials).map_err(InfraError::from)?;
            tx.execute(
                "UPDATE destinations SET credentials = ?1, updated_at = ?2 WHERE destination_id = ?3",
                params![updated, chrono::Utc::now().timestamp(), destination_id],
            )
            .map_err(InfraError::from)?;
            tx.commit().map_err(InfraError::from)?;

            debug!(destination_id = %destination_id, expires_at = %token.expires_at, "Stored refreshed token");
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

struct RawDestination {
    destination_id: String,
    user_id: String,
    provider_kind: String,
    credentials: String,
}

impl RawDestination {
    fn into_config(self) -> Result<DestinationConfig> {
        let provider_kind: ProviderKind = self.provider_kind.parse().map_err(|e: String| {
            BusySyncError::Database(format!("destination {}: {e}", self.destination_id))
        })?;
        let credentials = serde_json::from_str(&self.credentials).map_err(InfraError::from)?;
        Ok(DestinationConfig {
            destination_id: self.destination_id,
            user_id: self.user_id,
            provider_kind,
            credentials,
        })
    }
}

fn read_raw(row: &Row<'_>) -> rusqlite::Result<RawDestination> {
    Ok(RawDestination {
        destination_id: row.get(0)?,
        user_id: row.get(1)?,
        provider_kind: row.get(2)?,
        credentials: row.get(3)?,
    })
}
