//! Google Calendar destination

use std::sync::Arc;

use async_trait::async_trait;
use busysync_common::RateLimiter;
use busysync_core::{generate_uid, is_owned_identifier, CalendarDestination, ListOptions, TokenRefresher};
use busysync_domain::{
    BusySyncError, CanonicalEvent, DeleteResult, DestinationConfig, OAuthAccount, ProviderKind,
    PushResult, RemoteEvent, Result,
};
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use futures::future::join_all;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::oauth_calendar_id;
use crate::http::HttpClient;

pub const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const PAGE_SIZE: &str = "2500";

/// Adapter for one Google calendar.
///
/// Pushes use `events.import`, which upserts by iCalUID, so re-pushing an
/// event updates it in place.
pub struct GoogleCalendarDestination {
    destination_id: String,
    user_id: String,
    calendar_id: String,
    account: OAuthAccount,
    tokens: Arc<TokenRefresher>,
    http: HttpClient,
    limiter: Arc<RateLimiter>,
    api_base: String,
}

impl GoogleCalendarDestination {
    /// # Errors
    /// Returns `BusySyncError::Validation` unless `config` holds OAuth
    /// credentials.
    pub fn new(
        config: &DestinationConfig,
        tokens: Arc<TokenRefresher>,
        http: HttpClient,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self> {
        let calendar_id = oauth_calendar_id(config)?;
        let account = config.oauth_account().ok_or_else(|| {
            BusySyncError::Validation(format!("{} has no OAuth account", config.destination_id))
        })?;

        Ok(Self {
            destination_id: config.destination_id.clone(),
            user_id: config.user_id.clone(),
            calendar_id,
            account,
            tokens,
            http,
            limiter,
            api_base: GOOGLE_CALENDAR_API_BASE.to_string(),
        })
    }

    /// Point the adapter at another API root.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.api_base, urlencoding::encode(&self.calendar_id))
    }

    async fn push_one(&self, token: &str, event: &CanonicalEvent) -> PushResult {
        let uid = match generate_uid(&self.user_id, event) {
            Ok(uid) => uid,
            Err(e) => return PushResult::failed(e.to_string()),
        };

        let body = json!({
            "iCalUID": uid,
            "summary": event.summary,
            "description": event.description,
            "start": { "dateTime": event.start_time.to_rfc3339_opts(SecondsFormat::Secs, true) },
            "end": { "dateTime": event.end_time.to_rfc3339_opts(SecondsFormat::Secs, true) },
            "transparency": "opaque",
        });
        let request = self
            .http
            .request(Method::POST, format!("{}/import", self.events_url()))
            .bearer_auth(token)
            .json(&body);

        let imported = async {
            self.http
                .send(&self.limiter, request)
                .await?
                .error_for_status()?
                .json::<ImportedEvent>()
        }
        .await;

        match imported {
            Ok(imported) => PushResult::ok(imported.id),
            Err(e) => {
                debug!(event_id = %event.id, error = %e, "Google import failed");
                PushResult::failed(e.to_string())
            }
        }
    }

    /// Google event ids carrying `uid`.
    async fn find_event_ids(&self, token: &str, uid: &str) -> Result<Vec<String>> {
        let request = self
            .http
            .request(Method::GET, self.events_url())
            .bearer_auth(token)
            .query(&[("iCalUID", uid), ("showDeleted", "false")]);
        let page: EventsPage = self.http.send(&self.limiter, request).await?.error_for_status()?.json()?;
        Ok(page.items.into_iter().map(|item| item.id).collect())
    }

    async fn delete_one(&self, token: &str, uid: &str) -> DeleteResult {
        let ids = match self.find_event_ids(token, uid).await {
            Ok(ids) => ids,
            Err(e) => return DeleteResult::failed(e.to_string()),
        };

        for id in ids {
            let request = self
                .http
                .request(Method::DELETE, format!("{}/{}", self.events_url(), urlencoding::encode(&id)))
                .bearer_auth(token);
            match self.http.send(&self.limiter, request).await.and_then(|r| r.error_for_status()) {
                Ok(_) | Err(BusySyncError::NotFound(_)) => {}
                Err(e) => return DeleteResult::failed(e.to_string()),
            }
        }
        DeleteResult::ok()
    }
}

#[async_trait]
impl CalendarDestination for GoogleCalendarDestination {
    fn destination_id(&self) -> &str {
        &self.destination_id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    #[instrument(skip(self, events), fields(destination_id = %self.destination_id, count = events.len()))]
    async fn push_events(&self, events: &[CanonicalEvent]) -> Result<Vec<PushResult>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let token = self.tokens.ensure_valid(&self.account).await?;
        Ok(join_all(events.iter().map(|event| self.push_one(&token, event))).await)
    }

    #[instrument(skip(self, uids), fields(destination_id = %self.destination_id, count = uids.len()))]
    async fn delete_events(&self, uids: &[String]) -> Result<Vec<DeleteResult>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let token = self.tokens.ensure_valid(&self.account).await?;
        Ok(join_all(uids.iter().map(|uid| self.delete_one(&token, uid))).await)
    }

    #[instrument(skip(self), fields(destination_id = %self.destination_id))]
    async fn list_remote_events(&self, options: ListOptions) -> Result<Vec<RemoteEvent>> {
        let token = self.tokens.ensure_valid(&self.account).await?;
        let time_min = options.from.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = options.until.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("showDeleted", "false"),
                ("maxResults", PAGE_SIZE),
            ];
            if let Some(page_token) = page_token.as_deref() {
                query.push(("pageToken", page_token));
            }

            let request =
                self.http.request(Method::GET, self.events_url()).bearer_auth(&token).query(&query);
            let page: EventsPage =
                self.http.send(&self.limiter, request).await?.error_for_status()?.json()?;

            events.extend(page.items.into_iter().filter_map(GoogleEvent::into_remote));
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(count = events.len(), "Listed owned Google events");
        Ok(events)
    }
}

#[derive(Debug, Deserialize)]
struct ImportedEvent {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    #[serde(rename = "iCalUID")]
    ical_uid: Option<String>,
    status: Option<String>,
    start: Option<GoogleTime>,
    end: Option<GoogleTime>,
}

impl GoogleEvent {
    /// Owned, non-cancelled events only.
    fn into_remote(self) -> Option<RemoteEvent> {
        if self.status.as_deref() == Some("cancelled") {
            return None;
        }
        let uid = self.ical_uid.filter(|uid| is_owned_identifier(uid))?;
        let start_time = self.start?.to_utc()?;
        let end_time = self.end.and_then(GoogleTime::to_utc).unwrap_or(start_time);
        Some(RemoteEvent { uid, start_time, end_time })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTime {
    date_time: Option<DateTime<Utc>>,
    date: Option<NaiveDate>,
}

impl GoogleTime {
    fn to_utc(self) -> Option<DateTime<Utc>> {
        self.date_time.or_else(|| self.date.map(|d| d.and_time(NaiveTime::default()).and_utc()))
    }
}
