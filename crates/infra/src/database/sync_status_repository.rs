//! SQLite-backed sync status rows.
//!
//! One row per `(user_id, destination_id)`, holding the latest
//! [`SyncStatus`] as JSON. Writes replace the row.

use std::sync::Arc;

use async_trait::async_trait;
use busysync_core::SyncStatusRepository;
use busysync_domain::{Result, SyncStatus};
use rusqlite::{params, OptionalExtension};
use tokio::task;
use tracing::instrument;

use super::manager::{map_join_error, DbManager};
use crate::errors::InfraError;

/// Latest status per `(user, destination)`.
pub struct SqliteSyncStatusRepository {
    db: Arc<DbManager>,
}

impl SqliteSyncStatusRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncStatusRepository for SqliteSyncStatusRepository {
    #[instrument(skip(self, status), fields(destination_id = %status.destination_id, state = %status.status))]
    async fn upsert(&self, user_id: &str, status: &SyncStatus) -> Result<()> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();
        let destination_id = status.destination_id.clone();
        let payload = serde_json::to_string(status).map_err(InfraError::from)?;

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO sync_status (user_id, destination_id, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, destination_id) DO UPDATE SET
                    status = excluded.status,
                    updated_at = excluded.updated_at",
                params![user_id, destination_id, payload, chrono::Utc::now().timestamp()],
            )
            .map_err(InfraError::from)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn get(&self, user_id: &str, destination_id: &str) -> Result<Option<SyncStatus>> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();
        let destination_id = destination_id.to_string();

        task::spawn_blocking(move || -> Result<Option<SyncStatus>> {
            let conn = db.get_connection()?;
            let payload: Option<String> = conn
                .query_row(
                    "SELECT status FROM sync_status WHERE user_id = ?1 AND destination_id = ?2",
                    params![user_id, destination_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(InfraError::from)?;

            payload
                .map(|json| serde_json::from_str(&json).map_err(|e| InfraError::from(e).into()))
                .transpose()
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<SyncStatus>> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();

        task::spawn_blocking(move || -> Result<Vec<SyncStatus>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT status FROM sync_status WHERE user_id = ?1 ORDER BY destination_id",
                )
                .map_err(InfraError::from)?;
            let payloads = stmt
                .query_map(params![user_id], |row| row.get::<_, String>(0))
                .map_err(InfraError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(InfraError::from)?;

            payloads
                .iter()
                .map(|json| serde_json::from_str(json).map_err(|e| InfraError::from(e).into()))
                .collect()
        })
        .await
        .map_err(map_join_error)?
    }
}
