//! Single-process broker over `tokio::sync::broadcast`

use async_trait::async_trait;
use busysync_core::{BrokerSubscription, MessageBroker};
use busysync_domain::Result;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Single-process broker on a broadcast channel.
pub struct InMemoryBroker {
    sender: broadcast::Sender<String>,
    capacity: usize,
    shutdown: CancellationToken,
}

impl InMemoryBroker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity, shutdown: CancellationToken::new() }
    }

    /// End every open subscription.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for InMemoryBroker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, payload: String) -> Result<()> {
        if self.sender.send(payload).is_err() {
            debug!("No broker subscribers, message dropped");
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<BrokerSubscription> {
        let mut source = self.sender.subscribe();
        let (tx, rx) = mpsc::channel(self.capacity);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let payload = tokio::select! {
                    () = shutdown.cancelled() => break,
                    received = source.recv() => match received {
                        Ok(payload) => payload,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Broker subscriber lagged, messages dropped");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}
