//! Per-user sync epochs
//!
//! Every sync attempt for a user gets a new epoch; starting another attempt
//! makes earlier ones stale. Attempts still run concurrently, the epoch only
//! decides whose outcome is authoritative. Status reporting for a user is
//! serialized through a per-user lock so a stale attempt cannot interleave
//! with the current one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Opaque token for one sync attempt.
#[derive(Debug, PartialEq, Eq)]
pub struct SyncEpoch {
    user_id: String,
    sequence: u64,
}

impl SyncEpoch {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[derive(Debug)]
struct UserEpochs {
    latest: u64,
    active: usize,
    reporting: Arc<tokio::sync::Mutex<()>>,
}

#[derive(Debug, Default)]
pub struct SyncCoordinator {
    next_sequence: AtomicU64,
    users: Mutex<HashMap<String, UserEpochs>>,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new attempt for `user_id`, making earlier ones stale.
    pub fn start(&self, user_id: &str) -> SyncEpoch {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let mut users = self.users.lock();
        let entry = users.entry(user_id.to_string()).or_insert_with(|| UserEpochs {
            latest: 0,
            active: 0,
            reporting: Arc::new(tokio::sync::Mutex::new(())),
        });
        entry.latest = sequence;
        entry.active += 1;
        debug!(user_id, sequence, active = entry.active, "Sync epoch started");

        SyncEpoch { user_id: user_id.to_string(), sequence }
    }

    /// True when no later attempt has started for the epoch's user.
    pub fn is_current(&self, epoch: &SyncEpoch) -> bool {
        self.users.lock().get(&epoch.user_id).is_some_and(|user| user.latest == epoch.sequence)
    }

    /// Release bookkeeping for a finished attempt.
    pub fn end(&self, epoch: SyncEpoch) {
        let mut users = self.users.lock();
        if let Some(user) = users.get_mut(&epoch.user_id) {
            user.active = user.active.saturating_sub(1);
            if user.active == 0 {
                users.remove(&epoch.user_id);
            }
        }
        debug!(user_id = %epoch.user_id, sequence = epoch.sequence, "Sync epoch ended");
    }

    /// Start an attempt whose epoch ends when the guard drops.
    pub fn begin(self: &Arc<Self>, user_id: &str) -> EpochGuard {
        EpochGuard { epoch: Some(self.start(user_id)), coordinator: self.clone() }
    }

    /// Lock serializing status reporting for the epoch's user.
    pub fn reporting_lock(&self, epoch: &SyncEpoch) -> Option<Arc<tokio::sync::Mutex<()>>> {
        self.users.lock().get(&epoch.user_id).map(|user| user.reporting.clone())
    }

    /// Number of users with an attempt in flight.
    pub fn active_users(&self) -> usize {
        self.users.lock().len()
    }
}

/// Ends its epoch on every exit path.
#[derive(Debug)]
pub struct EpochGuard {
    epoch: Option<SyncEpoch>,
    coordinator: Arc<SyncCoordinator>,
}

impl EpochGuard {
    /// True while no newer attempt has started for the user.
    pub fn is_current(&self) -> bool {
        self.epoch.as_ref().is_some_and(|epoch| self.coordinator.is_current(epoch))
    }

    pub fn user_id(&self) -> &str {
        self.epoch.as_ref().map_or("", SyncEpoch::user_id)
    }

    /// Borrow the epoch for currency checks elsewhere.
    pub const fn epoch(&self) -> Option<&SyncEpoch> {
        self.epoch.as_ref()
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }
}

impl Drop for EpochGuard {
    fn drop(&mut self) {
        if let Some(epoch) = self.epoch.take() {
            self.coordinator.end(epoch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_start_makes_earlier_epoch_stale() {
        let coordinator = SyncCoordinator::new();
        let e1 = coordinator.start("user-u");
        let e2 = coordinator.start("user-u");

        assert!(!coordinator.is_current(&e1));
        assert!(coordinator.is_current(&e2));
    }

    #[test]
    fn users_are_independent() {
        let coordinator = SyncCoordinator::new();
        let a = coordinator.start("a");
        let b = coordinator.start("b");
        assert!(coordinator.is_current(&a));
        assert!(coordinator.is_current(&b));
    }

    #[test]
    fn stale_epoch_ending_first_keeps_current_epoch_current() {
        let coordinator = SyncCoordinator::new();
        let e1 = coordinator.start("u");
        let e2 = coordinator.start("u");

        coordinator.end(e1);
        assert!(coordinator.is_current(&e2));

        coordinator.end(e2);
        assert_eq!(coordinator.active_users(), 0);
    }

    #[test]
    fn guard_ends_epoch_on_drop() {
        let coordinator = Arc::new(SyncCoordinator::new());
        {
            let guard = coordinator.begin("u");
            assert!(guard.is_current());
            assert_eq!(guard.user_id(), "u");
            assert_eq!(coordinator.active_users(), 1);
        }
        assert_eq!(coordinator.active_users(), 0);
    }

    #[test]
    fn guard_ends_epoch_when_attempt_panics() {
        let coordinator = Arc::new(SyncCoordinator::new());
        let inner = coordinator.clone();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.begin("u");
            panic!("adapter bug");
        }));

        assert!(outcome.is_err());
        assert_eq!(coordinator.active_users(), 0);
    }

    #[test]
    fn reporting_lock_is_shared_per_user() {
        let coordinator = SyncCoordinator::new();
        let e1 = coordinator.start("u");
        let e2 = coordinator.start("u");
        let l1 = coordinator.reporting_lock(&e1).unwrap();
        let l2 = coordinator.reporting_lock(&e2).unwrap();
        assert!(Arc::ptr_eq(&l1, &l2));
    }
}
