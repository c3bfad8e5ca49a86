//! Multi-process broker over PostgreSQL `LISTEN`/`NOTIFY`
//!
//! One dedicated connection listens on the channel; notifications are
//! copied to every open subscription. Publishing goes through
//! `pg_notify` on the same connection. A lost connection is re-established
//! with capped exponential backoff and subscriptions survive the gap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use busysync_core::{BrokerSubscription, MessageBroker};
use busysync_domain::constants::DEFAULT_BROKER_CAPACITY;
use busysync_domain::{BusySyncError, Result};
use futures::{stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_postgres::tls::NoTlsStream;
use tokio_postgres::{AsyncMessage, Client, Connection, NoTls, Socket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::InfraError;

type Subscribers = Arc<Mutex<Vec<mpsc::Sender<String>>>>;
type ClientSlot = Arc<RwLock<Arc<Client>>>;

const RECONNECT_INITIAL_DELAY: Duration = Duration::from_millis(500);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// How a listener connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenEnd {
    Shutdown,
    Lost,
}

/// Everything a listener needs to (re)open its connection.
#[derive(Clone)]
struct Listener {
    url: String,
    channel: String,
    subscribers: Subscribers,
    shutdown: CancellationToken,
}

/// [`MessageBroker`] over PostgreSQL `LISTEN`/`NOTIFY`, for multi-process
/// deployments.
pub struct PostgresBroker {
    client: ClientSlot,
    channel: String,
    subscribers: Subscribers,
    shutdown: CancellationToken,
}

impl PostgresBroker {
    /// Connect to `url` and start listening on `channel`.
    ///
    /// # Errors
    /// Returns `BusySyncError::Config` for channel names that are not plain
    /// identifiers, or `BusySyncError::Network` when the first connection
    /// fails.
    pub async fn connect(url: &str, channel: &str) -> Result<Self> {
        validate_channel(channel)?;

        let listener = Listener {
            url: url.to_string(),
            channel: channel.to_string(),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            shutdown: CancellationToken::new(),
        };
        let (client, driver) = listener.open().await?;
        info!(channel, "Listening for broker notifications");

        let slot: ClientSlot = Arc::new(RwLock::new(Arc::new(client)));
        tokio::spawn(listener.clone().supervise(Arc::clone(&slot), driver));

        Ok(Self {
            client: slot,
            channel: listener.channel,
            subscribers: listener.subscribers,
            shutdown: listener.shutdown,
        })
    }

    /// Stop listening and close every subscription.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for PostgresBroker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Listener {
    /// Connect, start draining notifications and issue `LISTEN`.
    async fn open(&self) -> Result<(Client, JoinHandle<ListenEnd>)> {
        let (client, connection) =
            tokio_postgres::connect(&self.url, NoTls).await.map_err(InfraError::from)?;
        let driver = tokio::spawn(self.clone().drive(connection));

        if let Err(e) = client.batch_execute(&format!("LISTEN {}", self.channel)).await {
            driver.abort();
            return Err(InfraError::from(e).into());
        }
        Ok((client, driver))
    }

    /// Deliver notifications until the connection ends or shutdown.
    async fn drive(self, mut connection: Connection<Socket, NoTlsStream>) -> ListenEnd {
        let mut messages = Box::pin(stream::poll_fn(move |cx| connection.poll_message(cx)));
        loop {
            let message = tokio::select! {
                () = self.shutdown.cancelled() => return ListenEnd::Shutdown,
                message = messages.next() => message,
            };
            match message {
                Some(Ok(AsyncMessage::Notification(notification))) => {
                    if notification.channel() == self.channel {
                        deliver(&self.subscribers, notification.payload());
                    }
                }
                Some(Ok(AsyncMessage::Notice(notice))) => {
                    debug!(notice = %notice, "Postgres notice");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(error = %e, "Postgres broker connection failed");
                    return ListenEnd::Lost;
                }
                None => return ListenEnd::Lost,
            }
        }
    }

    /// Keep a listener connection alive until shutdown.
    async fn supervise(self, slot: ClientSlot, mut driver: JoinHandle<ListenEnd>) {
        loop {
            let end = driver.await.unwrap_or(ListenEnd::Lost);
            if end == ListenEnd::Shutdown || self.shutdown.is_cancelled() {
                break;
            }
            warn!(channel = %self.channel, "Postgres broker connection lost, reconnecting");

            match self.reconnect().await {
                Some((client, next)) => {
                    *slot.write() = Arc::new(client);
                    driver = next;
                    info!(channel = %self.channel, "Postgres broker reconnected");
                }
                None => break,
            }
        }
        self.subscribers.lock().clear();
        info!(channel = %self.channel, "Postgres broker listener stopped");
    }

    /// Retry [`Listener::open`] with backoff. `None` once shut down.
    async fn reconnect(&self) -> Option<(Client, JoinHandle<ListenEnd>)> {
        let mut delay = RECONNECT_INITIAL_DELAY;
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return None,
                () = tokio::time::sleep(delay) => {}
            }
            match self.open().await {
                Ok(opened) => return Some(opened),
                Err(e) => {
                    delay = next_reconnect_delay(delay);
                    warn!(error = %e, retry_in = ?delay, "Broker reconnect failed");
                }
            }
        }
    }
}

fn next_reconnect_delay(delay: Duration) -> Duration {
    delay.saturating_mul(2).min(RECONNECT_MAX_DELAY)
}

#[async_trait]
impl MessageBroker for PostgresBroker {
    async fn publish(&self, payload: String) -> Result<()> {
        let client = Arc::clone(&self.client.read());
        client
            .execute("SELECT pg_notify($1, $2)", &[&self.channel, &payload])
            .await
            .map_err(InfraError::from)?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<BrokerSubscription> {
        if self.shutdown.is_cancelled() {
            return Err(BusySyncError::Network("broker connection is closed".to_string()));
        }
        let (tx, rx) = mpsc::channel(DEFAULT_BROKER_CAPACITY);
        self.subscribers.lock().push(tx);
        Ok(rx)
    }
}

/// Copy `payload` to every live subscriber, dropping closed ones.
fn deliver(subscribers: &Mutex<Vec<mpsc::Sender<String>>>, payload: &str) {
    subscribers.lock().retain(|subscriber| match subscriber.try_send(payload.to_string()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("Broker subscriber is full, message dropped");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    });
}

fn validate_channel(channel: &str) -> Result<()> {
    let valid = !channel.is_empty()
        && channel.len() <= 63
        && channel.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && channel.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BusySyncError::Config(format!("invalid broker channel name: {channel:?}")))
    }
}
