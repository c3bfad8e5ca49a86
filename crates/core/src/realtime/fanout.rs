//! Broker subscriber forwarding messages to local connections

use std::sync::Arc;

use busysync_domain::{BroadcastMessage, BusySyncError, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::ports::BrokerSubscription;
use super::registry::ConnectionRegistry;

/// Forwards broker messages to this process's connections.
pub struct FanoutSubscriber {
    registry: Arc<ConnectionRegistry>,
}

impl FanoutSubscriber {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Validate one broker payload and forward `{event, data}` to the
    /// user's connections. Returns the number of connections reached.
    ///
    /// # Errors
    /// Returns `BusySyncError::Validation` for payloads that do not match the
    /// broadcast message shape.
    pub fn deliver(&self, payload: &str) -> Result<usize> {
        let message: BroadcastMessage = serde_json::from_str(payload)
            .map_err(|e| BusySyncError::Validation(format!("Malformed broadcast: {e}")))?;
        if message.user_id.is_empty() || message.event.is_empty() {
            return Err(BusySyncError::Validation(
                "Broadcast requires userId and event".to_string(),
            ));
        }

        let user_id = message.user_id.clone();
        Ok(self.registry.send_to_user(&user_id, &message.into_push()))
    }

    /// Consume the subscription until it closes.
    pub async fn run(self, mut subscription: BrokerSubscription) {
        while let Some(payload) = subscription.recv().await {
            match self.deliver(&payload) {
                Ok(delivered) => debug!(delivered, "Broadcast forwarded"),
                Err(e) => warn!(error = %e, "Dropping invalid broadcast"),
            }
        }
        info!("Broker subscription closed, fan-out stopped");
    }

    /// Run the subscriber on its own task.
    pub fn spawn(self, subscription: BrokerSubscription) -> JoinHandle<()> {
        tokio::spawn(self.run(subscription))
    }
}
