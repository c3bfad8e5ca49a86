//! Microsoft Graph calendar destination

use std::sync::Arc;

use async_trait::async_trait;
use busysync_common::RateLimiter;
use busysync_core::{generate_uid, is_owned_identifier, CalendarDestination, ListOptions, TokenRefresher};
use busysync_domain::{
    BusySyncError, CanonicalEvent, DeleteResult, DestinationConfig, OAuthAccount, ProviderKind,
    PushResult, RemoteEvent, Result,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::future::join_all;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::oauth_calendar_id;
use crate::http::HttpClient;

pub const MICROSOFT_GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const OUTLOOK_TIMEZONE_HEADER: &str = r#"outlook.timezone="UTC""#;
const GRAPH_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
/// Single-value extended property holding the minted identifier.
const UID_PROPERTY_ID: &str = "String {4d3a3f0e-8a43-4bc4-9a57-6f0c1b2e9d61} Name BusySyncUid";
const PAGE_SIZE: &str = "100";

/// Adapter for one Outlook calendar.
///
/// Graph has no upsert by external id, so pushes look the identifier up in
/// an extended property and then `PATCH` or `POST`.
pub struct MicrosoftCalendarDestination {
    destination_id: String,
    user_id: String,
    calendar_id: String,
    account: OAuthAccount,
    tokens: Arc<TokenRefresher>,
    http: HttpClient,
    limiter: Arc<RateLimiter>,
    api_base: String,
}

impl MicrosoftCalendarDestination {
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
            api_base: MICROSOFT_GRAPH_API_BASE.to_string(),
        })
    }

    /// Point the adapter at another API root.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn calendar_url(&self) -> String {
        if self.calendar_id.eq_ignore_ascii_case("primary") {
            format!("{}/me/calendar", self.api_base)
        } else {
            format!("{}/me/calendars/{}", self.api_base, urlencoding::encode(&self.calendar_id))
        }
    }

    fn event_url(&self, id: &str) -> String {
        format!("{}/me/events/{}", self.api_base, urlencoding::encode(id))
    }

    /// Graph event ids tagged with `uid`.
    async fn find_event_ids(&self, token: &str, uid: &str) -> Result<Vec<String>> {
        let filter = uid_filter(uid);
        let request = self
            .http
            .request(Method::GET, format!("{}/events", self.calendar_url()))
            .bearer_auth(token)
            .query(&[("$filter", filter.as_str()), ("$select", "id")]);
        let page: GraphPage = self.http.send(&self.limiter, request).await?.error_for_status()?.json()?;
        Ok(page.value.into_iter().map(|event| event.id).collect())
    }

    async fn push_one(&self, token: &str, event: &CanonicalEvent) -> PushResult {
        let uid = match generate_uid(&self.user_id, event) {
            Ok(uid) => uid,
            Err(e) => return PushResult::failed(e.to_string()),
        };

        let saved = async {
            let existing = self.find_event_ids(token, &uid).await?;
            let body = json!({
                "subject": event.summary,
                "body": { "contentType": "text", "content": event.description.clone().unwrap_or_default() },
                "start": { "dateTime": event.start_time.format(GRAPH_TIME_FORMAT).to_string(), "timeZone": "UTC" },
                "end": { "dateTime": event.end_time.format(GRAPH_TIME_FORMAT).to_string(), "timeZone": "UTC" },
                "showAs": "busy",
                "singleValueExtendedProperties": [{ "id": UID_PROPERTY_ID, "value": uid }],
            });

            let request = match existing.first() {
                Some(id) => self.http.request(Method::PATCH, self.event_url(id)),
                None => self.http.request(Method::POST, format!("{}/events", self.calendar_url())),
            }
            .bearer_auth(token)
            .json(&body);

            self.http.send(&self.limiter, request).await?.error_for_status()?.json::<GraphEventId>()
        }
        .await;

        match saved {
            Ok(saved) => PushResult::ok(saved.id),
            Err(e) => {
                debug!(event_id = %event.id, error = %e, "Graph upsert failed");
                PushResult::failed(e.to_string())
            }
        }
    }

    async fn delete_one(&self, token: &str, uid: &str) -> DeleteResult {
        let ids = match self.find_event_ids(token, uid).await {
            Ok(ids) => ids,
            Err(e) => return DeleteResult::failed(e.to_string()),
        };

        for id in ids {
            let request = self.http.request(Method::DELETE, self.event_url(&id)).bearer_auth(token);
            match self.http.send(&self.limiter, request).await.and_then(|r| r.error_for_status()) {
                Ok(_) | Err(BusySyncError::NotFound(_)) => {}
                Err(e) => return DeleteResult::failed(e.to_string()),
            }
        }
        DeleteResult::ok()
    }
}

#[async_trait]
impl CalendarDestination for MicrosoftCalendarDestination {
    fn destination_id(&self) -> &str {
        &self.destination_id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Microsoft
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
        let start = options.from.format(GRAPH_TIME_FORMAT).to_string();
        let end = options.until.format(GRAPH_TIME_FORMAT).to_string();
        let expand = format!("singleValueExtendedProperties($filter=id eq '{UID_PROPERTY_ID}')");

        let first = self
            .http
            .request(Method::GET, format!("{}/calendarView", self.calendar_url()))
            .query(&[
                ("startDateTime", start.as_str()),
                ("endDateTime", end.as_str()),
                ("$select", "id,start,end,isCancelled"),
                ("$expand", expand.as_str()),
                ("$top", PAGE_SIZE),
            ]);

        let mut events = Vec::new();
        let mut request = Some(first);
        while let Some(builder) = request.take() {
            let builder = builder.bearer_auth(&token).header("Prefer", OUTLOOK_TIMEZONE_HEADER);
            let page: GraphPage =
                self.http.send(&self.limiter, builder).await?.error_for_status()?.json()?;

            events.extend(page.value.into_iter().filter_map(GraphEvent::into_remote));
            request = page.next_link.map(|link| self.http.request(Method::GET, link));
        }

        debug!(count = events.len(), "Listed owned Outlook events");
        Ok(events)
    }
}

/// OData filter matching events tagged with `uid`.
fn uid_filter(uid: &str) -> String {
    format!("singleValueExtendedProperties/Any(ep: ep/id eq '{UID_PROPERTY_ID}' and ep/value eq '{uid}')")
}

#[derive(Debug, Deserialize)]
struct GraphEventId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GraphPage {
    #[serde(default)]
    value: Vec<GraphEvent>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphEvent {
    id: String,
    #[serde(default)]
    is_cancelled: bool,
    start: Option<GraphTime>,
    end: Option<GraphTime>,
    #[serde(default)]
    single_value_extended_properties: Vec<ExtendedProperty>,
}

impl GraphEvent {
    fn into_remote(self) -> Option<RemoteEvent> {
        if self.is_cancelled {
            return None;
        }
        let uid = self
            .single_value_extended_properties
            .into_iter()
            .find(|p| p.id.eq_ignore_ascii_case(UID_PROPERTY_ID))
            .map(|p| p.value)
            .filter(|uid| is_owned_identifier(uid))?;
        let start_time = self.start?.to_utc()?;
        let end_time = self.end.and_then(GraphTime::to_utc).unwrap_or(start_time);
        Some(RemoteEvent { uid, start_time, end_time })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphTime {
    date_time: String,
}

impl GraphTime {
    /// Graph returns UTC wall time without an offset when asked for UTC.
    fn to_utc(self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.date_time, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[derive(Debug, Deserialize)]
struct ExtendedProperty {
    id: String,
    value: String,
}
