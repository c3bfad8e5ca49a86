//! Pub/sub broker port

use async_trait::async_trait;
use busysync_domain::Result;
use tokio::sync::mpsc;

/// Raw payloads received from the broker channel.
pub type BrokerSubscription = mpsc::Receiver<String>;

/// Channel visible to every server process.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, payload: String) -> Result<()>;

    /// Open a subscription. It ends when the broker shuts down.
    async fn subscribe(&self) -> Result<BrokerSubscription>;
}
