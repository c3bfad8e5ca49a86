//! SQLite-backed canonical events.
//!
//! Serves both the sync read path ([`CanonicalEventSource`]) and the
//! ingestion write path ([`SlotRepository`]). Times are stored as epoch
//! milliseconds.

use std::sync::Arc;

use async_trait::async_trait;
use busysync_core::{CanonicalEventSource, SlotRepository};
use busysync_domain::{BusySyncError, CanonicalEvent, Result, StoredSlot};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tokio::task;
use tracing::{debug, instrument};

use super::manager::{map_join_error, DbManager};
use crate::errors::InfraError;

/// Canonical events in SQLite, read by sync passes and written by ingestion.
pub struct SqliteEventRepository {
    db: Arc<DbManager>,
}

impl SqliteEventRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CanonicalEventSource for SqliteEventRepository {
    #[instrument(skip(self), fields(from = %from, until = %until))]
    async fn list_events(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CanonicalEvent>> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();

        task::spawn_blocking(move || -> Result<Vec<CanonicalEvent>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, start_ms, end_ms, summary, description, source_id, source_name
                     FROM canonical_events
                     WHERE user_id = ?1 AND end_ms > ?2 AND start_ms < ?3
                     ORDER BY start_ms, seq",
                )
                .map_err(InfraError::from)?;
            let events = stmt
                .query_map(
                    params![user_id, from.timestamp_millis(), until.timestamp_millis()],
                    read_event,
                )
                .map_err(InfraError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(InfraError::from)?;
            Ok(events)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl SlotRepository for SqliteEventRepository {
    async fn list_slots(&self, user_id: &str, source_id: &str) -> Result<Vec<StoredSlot>> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();
        let source_id = source_id.to_string();

        task::spawn_blocking(move || -> Result<Vec<StoredSlot>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, start_ms, end_ms FROM canonical_events
                     WHERE user_id = ?1 AND source_id = ?2
                     ORDER BY seq",
                )
                .map_err(InfraError::from)?;
            let slots = stmt
                .query_map(params![user_id, source_id], |row| {
                    Ok(StoredSlot {
                        id: row.get(0)?,
                        start_time: from_millis(row.get(1)?)?,
                        end_time: from_millis(row.get(2)?)?,
                    })
                })
                .map_err(InfraError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(InfraError::from)?;
            Ok(slots)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self, additions, removals), fields(added = additions.len(), removed = removals.len()))]
    async fn apply_changes(
        &self,
        user_id: &str,
        additions: &[CanonicalEvent],
        removals: &[String],
    ) -> Result<()> {
        if additions.is_empty() && removals.is_empty() {
            return Ok(());
        }

        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();
        let additions = additions.to_vec();
        let removals = removals.to_vec();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(InfraError::from)?;
            {
                let mut insert = tx
                    .prepare(
                        "INSERT INTO canonical_events
                            (id, user_id, source_id, source_name, start_ms, end_ms, summary, description)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    )
                    .map_err(InfraError::from)?;
                for event in &additions {
                    insert
                        .execute(params![
                            event.id,
                            user_id,
                            event.source_id,
                            event.source_name,
                            event.start_time.timestamp_millis(),
                            event.end_time.timestamp_millis(),
                            event.summary,
                            event.description,
                        ])
                        .map_err(InfraError::from)?;
                }

                let mut delete = tx
                    .prepare("DELETE FROM canonical_events WHERE user_id = ?1 AND id = ?2")
                    .map_err(InfraError::from)?;
                for id in &removals {
                    delete.execute(params![user_id, id]).map_err(InfraError::from)?;
                }
            }
            tx.commit().map_err(InfraError::from)?;

            debug!(user_id = %user_id, added = additions.len(), removed = removals.len(), "Applied slot changes");
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

fn read_event(row: &Row<'_>) -> rusqlite::Result<CanonicalEvent> {
    Ok(CanonicalEvent {
        id: row.get(0)?,
        start_time: from_millis(row.get(1)?)?,
        end_time: from_millis(row.get(2)?)?,
        summary: row.get(3)?,
        description: row.get(4)?,
        source_id: row.get(5)?,
        source_name: row.get(6)?,
    })
}

fn from_millis(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Integer,
            Box::new(BusySyncError::Database(format!("timestamp out of range: {ms}"))),
        )
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    use super::*;

    async fn setup() -> (SqliteEventRepository, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let mgr = Arc::new(
            DbManager::new(temp_dir.path().join("events.db"), 4).expect("db manager created"),
        );
        mgr.run_migrations().expect("migrations run");
        (SqliteEventRepository::new(mgr), temp_dir)
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
    }

    fn event(id: &str, source: &str, start: u32, end: u32) -> CanonicalEvent {
        CanonicalEvent {
            id: id.to_string(),
            start_time: at(start),
            end_time: at(end),
            summary: "Busy".to_string(),
            description: None,
            source_id: source.to_string(),
            source_name: Some("Work".to_string()),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slots_come_back_in_insertion_order() {
        let (repo, _dir) = setup().await;

        repo.apply_changes(
            "alice",
            &[event("e-3", "src", 15, 16), event("e-1", "src", 9, 10), event("e-2", "other", 11, 12)],
            &[],
        )
        .await
        .unwrap();

        let ids: Vec<String> =
            repo.list_slots("alice", "src").await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["e-3", "e-1"]);
        assert!(repo.list_slots("bob", "src").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn apply_changes_inserts_and_removes_together() {
        let (repo, _dir) = setup().await;
        repo.apply_changes("alice", &[event("e-1", "src", 9, 10), event("e-2", "src", 11, 12)], &[])
            .await
            .unwrap();

        repo.apply_changes("alice", &[event("e-3", "src", 13, 14)], &["e-1".to_string()])
            .await
            .unwrap();

        let slots = repo.list_slots("alice", "src").await.unwrap();
        let ids: Vec<&str> = slots.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["e-2", "e-3"]);
        assert_eq!(slots[1].start_time, at(13));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_insert_rolls_back_removals() {
        let (repo, _dir) = setup().await;
        repo.apply_changes("alice", &[event("e-1", "src", 9, 10)], &[]).await.unwrap();

        let duplicate = repo
            .apply_changes("alice", &[event("e-1", "src", 9, 10)], &["e-1".to_string()])
            .await;
        assert!(duplicate.is_err());

        assert_eq!(repo.list_slots("alice", "src").await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_events_returns_the_window_for_one_user() {
        let (repo, _dir) = setup().await;
        repo.apply_changes(
            "alice",
            &[event("early", "src", 1, 2), event("morning", "src", 9, 10), event("late", "src", 20, 21)],
            &[],
        )
        .await
        .unwrap();
        repo.apply_changes("bob", &[event("bob-1", "src", 9, 10)], &[]).await.unwrap();

        let events = repo.list_events("alice", at(8), at(18)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], event("morning", "src", 9, 10));

        let spanning = repo.list_events("alice", at(1) + Duration::minutes(30), at(9)).await.unwrap();
        let ids: Vec<&str> = spanning.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["early"]);
    }
}
