//! Deterministic identifiers for events minted by this engine
//!
//! An identifier has the shape `busysync-<digest>-<check>@busysync.app`:
//! - `digest`: first 40 hex chars of SHA-256 over the user id, source id and
//!   the event's time range
//! - `check`: first 8 hex chars of SHA-256 over the digest
//!
//! Summary and description never participate, so renaming an event keeps
//! its identifier. The check lets [`is_owned_identifier`] recognise minted
//! identifiers without knowing which user they belong to.

use busysync_domain::constants::{UID_CHECK_HEX_LEN, UID_DIGEST_HEX_LEN, UID_PREFIX, UID_SUFFIX};
use busysync_domain::{BusySyncError, CanonicalEvent, Result};
use sha2::{Digest, Sha256};

const CHECK_DOMAIN: &[u8] = b"busysync-uid-check\0";

/// Mint the identifier for `event` under `user_id`.
///
/// # Errors
/// Returns `BusySyncError::Validation` when the user or source id is empty or
/// the event ends before it starts.
pub fn generate_uid(user_id: &str, event: &CanonicalEvent) -> Result<String> {
    if user_id.trim().is_empty() {
        return Err(BusySyncError::Validation("user id must not be empty".to_string()));
    }
    if event.source_id.trim().is_empty() {
        return Err(BusySyncError::Validation(format!("event {} has no source id", event.id)));
    }
    if event.end_time < event.start_time {
        return Err(BusySyncError::Validation(format!(
            "event {} ends before it starts",
            event.id
        )));
    }

    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(event.source_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(event.start_time.timestamp_millis().to_be_bytes());
    hasher.update(event.end_time.timestamp_millis().to_be_bytes());
    let digest = hex::encode(hasher.finalize());
    let digest = &digest[..UID_DIGEST_HEX_LEN];

    Ok(format!("{UID_PREFIX}{digest}-{}{UID_SUFFIX}", check_for(digest)))
}

/// True when `uid` was minted by [`generate_uid`] for any user.
pub fn is_owned_identifier(uid: &str) -> bool {
    let Some(body) = uid.strip_prefix(UID_PREFIX).and_then(|rest| rest.strip_suffix(UID_SUFFIX))
    else {
        return false;
    };
    let Some((digest, check)) = body.split_once('-') else {
        return false;
    };

    digest.len() == UID_DIGEST_HEX_LEN
        && check.len() == UID_CHECK_HEX_LEN
        && is_lower_hex(digest)
        && is_lower_hex(check)
        && check_for(digest) == check
}

fn check_for(digest: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(CHECK_DOMAIN);
    hasher.update(digest.as_bytes());
    let check = hex::encode(hasher.finalize());
    check[..UID_CHECK_HEX_LEN].to_string()
}

fn is_lower_hex(value: &str) -> bool {
    value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
