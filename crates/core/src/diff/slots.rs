//! Multiset time-slot diff for pull-in ingestion
//!
//! Slots are compared by `(start, end)` with multiplicity, so two identical
//! busy blocks in a source stay two stored rows. Additions cover the whole
//! surplus of a key; a stored surplus loses one row per pass, so repeated
//! ingestion of the same feed converges on the parsed multiplicity.

use std::collections::HashMap;

use busysync_domain::{EventTimeSlot, StoredSlot};

/// Changes needed to make stored slots match a freshly parsed source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotDiff {
    /// Slots to insert; repeated once per missing occurrence.
    pub to_add: Vec<EventTimeSlot>,
    /// Storage ids of surplus stored rows, at most one per key.
    pub to_remove: Vec<String>,
}

impl SlotDiff {
    /// True when stored rows already match the source.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Diff `remote` slots against `stored` rows.
///
/// When several stored rows share a key and some must go, the earliest row
/// in `stored` order is removed.
pub fn diff_slots(remote: &[EventTimeSlot], stored: &[StoredSlot]) -> SlotDiff {
    let mut remote_counts: HashMap<EventTimeSlot, usize> = HashMap::new();
    let mut key_order: Vec<EventTimeSlot> = Vec::new();
    for slot in remote {
        let count = remote_counts.entry(*slot).or_insert(0);
        if *count == 0 {
            key_order.push(*slot);
        }
        *count += 1;
    }

    let mut stored_by_key: HashMap<EventTimeSlot, Vec<&StoredSlot>> = HashMap::new();
    for row in stored {
        let key = row.slot();
        let rows = stored_by_key.entry(key).or_default();
        if rows.is_empty() && !remote_counts.contains_key(&key) {
            key_order.push(key);
        }
        rows.push(row);
    }

    let mut diff = SlotDiff::default();
    for key in key_order {
        let remote_count = remote_counts.get(&key).copied().unwrap_or(0);
        let rows = stored_by_key.get(&key).map_or(&[][..], Vec::as_slice);

        if remote_count > rows.len() {
            diff.to_add.extend(std::iter::repeat(key).take(remote_count - rows.len()));
        } else if rows.len() > remote_count {
            if let Some(row) = rows.first() {
                diff.to_remove.push(row.id.clone());
            }
        }
    }
    diff
}
