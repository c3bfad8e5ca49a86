//! Identity-based diff for push-out sync

use std::collections::{HashMap, HashSet};

use busysync_domain::{CanonicalEvent, RemoteEvent, Result};

use crate::identity::generate_uid;

/// Changes needed to make a destination mirror the local events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityDiff {
    /// Local events missing remotely, in local order.
    pub to_add: Vec<CanonicalEvent>,
    /// Remote identifiers with no local event, in remote order.
    pub to_remove: Vec<String>,
    /// Distinct identifiers minted from the local events.
    pub local_identifiers: usize,
    /// Distinct identifiers reported by the destination.
    pub remote_identifiers: usize,
}

impl IdentityDiff {
    /// True when the destination already mirrors the local events.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Number of primitive operations the diff calls for.
    pub fn total(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

/// Compare local events (minting each identifier under `user_id`) against
/// remote events. Runs in O(n + m).
///
/// # Errors
/// Propagates identifier validation errors for malformed local events.
pub fn diff_by_identity(
    user_id: &str,
    local: &[CanonicalEvent],
    remote: &[RemoteEvent],
) -> Result<IdentityDiff> {
    let remote_uids: HashSet<&str> = remote.iter().map(|event| event.uid.as_str()).collect();

    let mut local_by_uid: HashMap<String, &CanonicalEvent> = HashMap::with_capacity(local.len());
    let mut to_add = Vec::new();
    for event in local {
        let uid = generate_uid(user_id, event)?;
        if local_by_uid.contains_key(&uid) {
            continue;
        }
        if !remote_uids.contains(uid.as_str()) {
            to_add.push(event.clone());
        }
        local_by_uid.insert(uid, event);
    }

    let mut seen = HashSet::with_capacity(remote.len());
    let to_remove = remote
        .iter()
        .map(|event| event.uid.as_str())
        .filter(|uid| !local_by_uid.contains_key(*uid) && seen.insert(*uid))
        .map(str::to_string)
        .collect();

    Ok(IdentityDiff {
        to_add,
        to_remove,
        local_identifiers: local_by_uid.len(),
        remote_identifiers: remote_uids.len(),
    })
}
