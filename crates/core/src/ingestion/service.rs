//! Source ingestion service

use std::sync::Arc;

use busysync_domain::constants::DEFAULT_EVENT_SUMMARY;
use busysync_domain::{BusySyncError, CanonicalEvent, EventTimeSlot, Result};
use tracing::{info, instrument};
use uuid::Uuid;

use super::ports::SlotRepository;
use crate::diff::diff_slots;

/// Source calendar being ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub id: String,
    pub name: Option<String>,
}

/// Rows inserted and deleted by one ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionResult {
    pub added: usize,
    pub removed: usize,
}

/// Pull-in side: keeps stored canonical events in step with parsed sources.
pub struct IngestionService {
    slots: Arc<dyn SlotRepository>,
}

impl IngestionService {
    pub fn new(slots: Arc<dyn SlotRepository>) -> Self {
        Self { slots }
    }

    /// Make the stored events for `source` match `parsed` slot-for-slot.
    ///
    /// # Errors
    /// Returns `BusySyncError::Validation` before touching storage when any
    /// slot ends before it starts, and the repository's error otherwise.
    #[instrument(skip(self, parsed), fields(source_id = %source.id, slots = parsed.len()))]
    pub async fn ingest_source(
        &self,
        user_id: &str,
        source: &SourceRef,
        parsed: &[EventTimeSlot],
    ) -> Result<IngestionResult> {
        if let Some(bad) = parsed.iter().find(|slot| slot.end_time < slot.start_time) {
            return Err(BusySyncError::Validation(format!(
                "Slot ending {} before its start {}",
                bad.end_time, bad.start_time
            )));
        }

        let stored = self.slots.list_slots(user_id, &source.id).await?;
        let diff = diff_slots(parsed, &stored);
        if diff.is_empty() {
            return Ok(IngestionResult::default());
        }

        let additions: Vec<CanonicalEvent> = diff
            .to_add
            .iter()
            .map(|slot| CanonicalEvent {
                id: Uuid::now_v7().to_string(),
                start_time: slot.start_time,
                end_time: slot.end_time,
                summary: DEFAULT_EVENT_SUMMARY.to_string(),
                description: None,
                source_id: source.id.clone(),
                source_name: source.name.clone(),
            })
            .collect();

        self.slots.apply_changes(user_id, &additions, &diff.to_remove).await?;

        let result = IngestionResult { added: additions.len(), removed: diff.to_remove.len() };
        info!(user_id, added = result.added, removed = result.removed, "Source ingested");
        Ok(result)
    }
}
