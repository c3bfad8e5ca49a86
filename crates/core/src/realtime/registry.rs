//! Live push connections held by this process
//!
//! Constructed at startup and shut down explicitly. A user's entry exists
//! only while they have at least one connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use busysync_domain::{BusySyncError, PushMessage, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Outbound half of a connection's writer queue.
pub type ConnectionSender = mpsc::UnboundedSender<PushMessage>;

/// Process-unique connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Live connections per user.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    users: Mutex<HashMap<String, HashMap<ConnectionId, ConnectionSender>>>,
    shut_down: AtomicBool,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection for `user_id`.
    ///
    /// # Errors
    /// Returns `BusySyncError::Internal` after [`shutdown`](Self::shutdown).
    pub fn register(&self, user_id: &str, sender: ConnectionSender) -> Result<ConnectionId> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(BusySyncError::Internal("connection registry is shut down".to_string()));
        }

        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.users.lock().entry(user_id.to_string()).or_default().insert(id, sender);
        debug!(user_id, connection = %id, "Connection registered");
        Ok(id)
    }

    /// Remove a connection; drops the user's entry once it is empty.
    pub fn unregister(&self, user_id: &str, id: ConnectionId) -> bool {
        let mut users = self.users.lock();
        let Some(connections) = users.get_mut(user_id) else {
            return false;
        };
        let removed = connections.remove(&id).is_some();
        if connections.is_empty() {
            users.remove(user_id);
        }
        debug!(user_id, connection = %id, removed, "Connection unregistered");
        removed
    }

    /// Queue `message` on every connection of `user_id`. Connections whose
    /// writer has gone away are pruned. Returns the number delivered.
    pub fn send_to_user(&self, user_id: &str, message: &PushMessage) -> usize {
        let mut users = self.users.lock();
        let Some(connections) = users.get_mut(user_id) else {
            return 0;
        };

        connections.retain(|_, sender| sender.send(message.clone()).is_ok());
        let delivered = connections.len();
        if connections.is_empty() {
            users.remove(user_id);
        }
        delivered
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        self.users.lock().get(user_id).map_or(0, HashMap::len)
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Refuse new connections and drop every sender, which closes the
    /// writer queues of live connections.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        let mut users = self.users.lock();
        let closed: usize = users.values().map(HashMap::len).sum();
        users.clear();
        info!(closed, "Connection registry shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_user_entries_are_dropped() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        let a = registry.register("u", tx1).unwrap();
        let b = registry.register("u", tx2).unwrap();
        assert_eq!(registry.connection_count("u"), 2);

        assert!(registry.unregister("u", a));
        assert_eq!(registry.user_count(), 1);
        assert!(registry.unregister("u", b));
        assert_eq!(registry.user_count(), 0);
        assert!(!registry.unregister("u", b));
    }

    #[test]
    fn send_reaches_only_the_target_user() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register("a", tx_a).unwrap();
        registry.register("b", tx_b).unwrap();

        let delivered = registry.send_to_user("a", &PushMessage::control("hello"));
        assert_eq!(delivered, 1);
        assert_eq!(rx_a.try_recv().unwrap().event, "hello");
        assert!(rx_b.try_recv().is_err());
        assert_eq!(registry.send_to_user("nobody", &PushMessage::control("x")), 0);
    }

    #[test]
    fn closed_connections_are_pruned_on_send() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register("u", tx).unwrap();
        drop(rx);

        assert_eq!(registry.send_to_user("u", &PushMessage::control("x")), 0);
        assert_eq!(registry.user_count(), 0);
    }

    #[test]
    fn shutdown_closes_writers_and_rejects_new_connections() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("u", tx).unwrap();

        registry.shutdown();
        assert!(registry.is_shut_down());
        assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));

        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(registry.register("u", tx).is_err());
    }
}
