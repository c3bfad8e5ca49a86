//! Message brokers and the WebSocket push endpoint

pub mod memory;
pub mod postgres;
pub mod server;

pub use memory::InMemoryBroker;
pub use postgres::PostgresBroker;
pub use server::{router, RealtimeState, USER_HEADER};

use std::sync::Arc;

use busysync_core::MessageBroker;
use busysync_domain::{BrokerConfig, Result};

/// Build the broker selected by configuration.
pub async fn connect_broker(config: &BrokerConfig) -> Result<Arc<dyn MessageBroker>> {
    match config {
        BrokerConfig::InMemory { capacity } => Ok(Arc::new(InMemoryBroker::new(*capacity))),
        BrokerConfig::Postgres { url, channel } => {
            Ok(Arc::new(PostgresBroker::connect(url, channel).await?))
        }
    }
}
