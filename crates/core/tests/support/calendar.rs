use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use busysync_core::{generate_uid, is_owned_identifier, CalendarDestination, ListOptions, StatusSink};
use busysync_domain::{
    BusySyncError, CanonicalEvent, DeleteResult, ProviderKind, PushResult, RemoteEvent, Result,
    SyncStatus,
};
use tokio::sync::Notify;

/// In-memory destination that records every primitive call.
///
/// Pushed events become remote events keyed by their minted identifier, so
/// repeated passes converge the same way a real destination would.
pub struct MockDestination {
    destination_id: String,
    user_id: String,
    kind: ProviderKind,
    remote: Mutex<Vec<RemoteEvent>>,
    pub push_calls: Mutex<Vec<Vec<String>>>,
    pub delete_calls: Mutex<Vec<Vec<String>>>,
    failing_pushes: Mutex<HashSet<String>>,
    list_error: Mutex<Option<BusySyncError>>,
    list_gate: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
    truncate_push_results: Mutex<bool>,
}

impl MockDestination {
    pub fn new(destination_id: &str, user_id: &str, kind: ProviderKind) -> Self {
        Self {
            destination_id: destination_id.to_string(),
            user_id: user_id.to_string(),
            kind,
            remote: Mutex::new(Vec::new()),
            push_calls: Mutex::new(Vec::new()),
            delete_calls: Mutex::new(Vec::new()),
            failing_pushes: Mutex::new(HashSet::new()),
            list_error: Mutex::new(None),
            list_gate: Mutex::new(None),
            truncate_push_results: Mutex::new(false),
        }
    }

    pub fn with_remote(self, events: Vec<RemoteEvent>) -> Self {
        *self.remote.lock().unwrap() = events;
        self
    }

    /// Make pushes of the local event with this id fail.
    pub fn fail_push_of(self, event_id: &str) -> Self {
        self.failing_pushes.lock().unwrap().insert(event_id.to_string());
        self
    }

    /// Return one result fewer than the events pushed.
    pub fn truncate_push_results(self) -> Self {
        *self.truncate_push_results.lock().unwrap() = true;
        self
    }

    pub fn fail_listing(self, error: BusySyncError) -> Self {
        *self.list_error.lock().unwrap() = Some(error);
        self
    }

    /// Block the next listing until `release` is notified; `entered` fires
    /// once the listing is waiting.
    pub fn gate_next_listing(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.list_gate.lock().unwrap() = Some((entered.clone(), release.clone()));
        (entered, release)
    }

    pub fn remote_events(&self) -> Vec<RemoteEvent> {
        self.remote.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarDestination for MockDestination {
    fn destination_id(&self) -> &str {
        &self.destination_id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn provider_kind(&self) -> ProviderKind {
        self.kind
    }

    async fn push_events(&self, events: &[CanonicalEvent]) -> Result<Vec<PushResult>> {
        self.push_calls.lock().unwrap().push(events.iter().map(|e| e.id.clone()).collect());

        let failing = self.failing_pushes.lock().unwrap().clone();
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            if failing.contains(&event.id) {
                results.push(PushResult::failed("server rejected event"));
                continue;
            }
            let uid = generate_uid(&self.user_id, event)?;
            let mut remote = self.remote.lock().unwrap();
            remote.retain(|r| r.uid != uid);
            remote.push(RemoteEvent {
                uid: uid.clone(),
                start_time: event.start_time,
                end_time: event.end_time,
            });
            results.push(PushResult::ok(uid));
        }
        if *self.truncate_push_results.lock().unwrap() {
            results.pop();
        }
        Ok(results)
    }

    async fn delete_events(&self, uids: &[String]) -> Result<Vec<DeleteResult>> {
        self.delete_calls.lock().unwrap().push(uids.to_vec());
        let mut remote = self.remote.lock().unwrap();
        remote.retain(|r| !uids.contains(&r.uid));
        Ok(uids.iter().map(|_| DeleteResult::ok()).collect())
    }

    async fn list_remote_events(&self, options: ListOptions) -> Result<Vec<RemoteEvent>> {
        let gate = self.list_gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            entered.notify_one();
            release.notified().await;
        }
        if let Some(error) = self.list_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self
            .remote
            .lock()
            .unwrap()
            .iter()
            .filter(|r| is_owned_identifier(&r.uid))
            .filter(|r| r.end_time > options.from && r.start_time < options.until)
            .cloned()
            .collect())
    }
}

/// Sink collecting every published status.
#[derive(Default)]
pub struct RecordingSink {
    pub statuses: Mutex<Vec<SyncStatus>>,
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn publish(&self, status: SyncStatus) {
        self.statuses.lock().unwrap().push(status);
    }
}
