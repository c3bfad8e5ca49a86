use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use busysync_core::{
    BrokerSubscription, CalendarDestination, CanonicalEventSource, DestinationFactory,
    DestinationRepository, MessageBroker, SyncStatusRepository,
};
use busysync_domain::{BusySyncError, CanonicalEvent, DestinationConfig, Result, SyncStatus};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Notify};

use super::calendar::MockDestination;

#[derive(Default)]
pub struct MemoryStatusRepository {
    pub writes: Mutex<Vec<(String, SyncStatus)>>,
}

impl MemoryStatusRepository {
    pub fn last_for(&self, destination_id: &str) -> Option<SyncStatus> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(_, s)| s.destination_id == destination_id)
            .map(|(_, s)| s.clone())
    }
}

#[async_trait]
impl SyncStatusRepository for MemoryStatusRepository {
    async fn upsert(&self, user_id: &str, status: &SyncStatus) -> Result<()> {
        self.writes.lock().unwrap().push((user_id.to_string(), status.clone()));
        Ok(())
    }

    async fn get(&self, _user_id: &str, destination_id: &str) -> Result<Option<SyncStatus>> {
        Ok(self.last_for(destination_id))
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<SyncStatus>> {
        Ok(self
            .writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == user_id)
            .map(|(_, s)| s.clone())
            .collect())
    }
}

pub struct MemoryDestinationRepository {
    configs: Vec<DestinationConfig>,
}

impl MemoryDestinationRepository {
    pub fn new(configs: Vec<DestinationConfig>) -> Self {
        Self { configs }
    }
}

#[async_trait]
impl DestinationRepository for MemoryDestinationRepository {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<DestinationConfig>> {
        Ok(self.configs.iter().filter(|c| c.user_id == user_id).cloned().collect())
    }

    async fn list_users(&self) -> Result<Vec<String>> {
        let mut users: Vec<String> = self.configs.iter().map(|c| c.user_id.clone()).collect();
        users.sort();
        users.dedup();
        Ok(users)
    }

    async fn save(&self, _config: &DestinationConfig) -> Result<()> {
        Ok(())
    }
}

/// Event source that can hold its next call and then fail it.
#[derive(Default)]
pub struct MemoryEventSource {
    events: Mutex<Vec<CanonicalEvent>>,
    gate: Mutex<Option<(Arc<Notify>, Arc<Notify>, Option<BusySyncError>)>>,
}

impl MemoryEventSource {
    pub fn new(events: Vec<CanonicalEvent>) -> Self {
        Self { events: Mutex::new(events), gate: Mutex::new(None) }
    }

    /// Hold the next call until released, then return `error` if given.
    pub fn gate_next_call(&self, error: Option<BusySyncError>) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some((entered.clone(), release.clone(), error));
        (entered, release)
    }
}

#[async_trait]
impl CanonicalEventSource for MemoryEventSource {
    async fn list_events(
        &self,
        _user_id: &str,
        _from: DateTime<Utc>,
        _until: DateTime<Utc>,
    ) -> Result<Vec<CanonicalEvent>> {
        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release, error)) = gate {
            entered.notify_one();
            release.notified().await;
            if let Some(error) = error {
                return Err(error);
            }
        }
        Ok(self.events.lock().unwrap().clone())
    }
}

/// Factory handing out pre-built mock destinations by id.
#[derive(Default)]
pub struct MockFactory {
    destinations: HashMap<String, Arc<MockDestination>>,
    broken: HashMap<String, BusySyncError>,
}

impl MockFactory {
    pub fn with(mut self, destination: Arc<MockDestination>) -> Self {
        self.destinations.insert(destination.destination_id().to_string(), destination);
        self
    }

    pub fn broken(mut self, destination_id: &str, error: BusySyncError) -> Self {
        self.broken.insert(destination_id.to_string(), error);
        self
    }
}

#[async_trait]
impl DestinationFactory for MockFactory {
    async fn build(&self, config: &DestinationConfig) -> Result<Arc<dyn CalendarDestination>> {
        if let Some(error) = self.broken.get(&config.destination_id) {
            return Err(error.clone());
        }
        self.destinations
            .get(&config.destination_id)
            .map(|d| d.clone() as Arc<dyn CalendarDestination>)
            .ok_or_else(|| BusySyncError::NotFound(config.destination_id.clone()))
    }
}

#[derive(Default)]
pub struct RecordingBroker {
    pub published: Mutex<Vec<String>>,
}

#[async_trait]
impl MessageBroker for RecordingBroker {
    async fn publish(&self, payload: String) -> Result<()> {
        self.published.lock().unwrap().push(payload);
        Ok(())
    }

    async fn subscribe(&self) -> Result<BrokerSubscription> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }
}
