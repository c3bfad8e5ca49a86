//! Generic CalDAV destination
//!
//! iCloud, Fastmail, Nextcloud and self-hosted servers share this adapter;
//! a [`CalDavProfile`] supplies the vendor differences.

use std::sync::Arc;

use async_trait::async_trait;
use busysync_common::RateLimiter;
use busysync_core::{generate_uid, is_owned_identifier, CalendarDestination, ListOptions};
use busysync_domain::{
    BusySyncError, CalDavProfile, CanonicalEvent, DeleteResult, ProviderKind, PushResult,
    RemoteEvent, Result,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder};
use tracing::{debug, instrument, warn};

use crate::http::HttpClient;
use crate::integrations::calendar::ics::{parse_remote_events, render_event};

const CALDAV_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Plaintext CalDAV login, decrypted by the factory.
#[derive(Clone)]
pub struct CalDavLogin {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for CalDavLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalDavLogin").field("username", &self.username).finish_non_exhaustive()
    }
}

/// Adapter for one CalDAV collection. Events live at `<collection><uid>.ics`.
pub struct CalDavDestination {
    destination_id: String,
    user_id: String,
    profile: CalDavProfile,
    collection_url: String,
    login: CalDavLogin,
    http: HttpClient,
    limiter: Arc<RateLimiter>,
}

impl CalDavDestination {
    /// # Errors
    /// Returns `BusySyncError::Validation` when `calendar_url` cannot be
    /// resolved against the profile.
    pub fn new(
        destination_id: impl Into<String>,
        user_id: impl Into<String>,
        profile: CalDavProfile,
        calendar_url: &str,
        login: CalDavLogin,
        http: HttpClient,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self> {
        let collection_url = profile.resolve_calendar_url(calendar_url)?;
        Ok(Self {
            destination_id: destination_id.into(),
            user_id: user_id.into(),
            profile,
            collection_url,
            login,
            http,
            limiter,
        })
    }

    /// Absolute collection URL, ending in `/`.
    pub fn collection_url(&self) -> &str {
        &self.collection_url
    }

    fn resource_url(&self, uid: &str) -> String {
        format!("{}{}.ics", self.collection_url, uid)
    }

    fn authed(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.login.username, Some(&self.login.password))
    }

    async fn push_one(&self, event: &CanonicalEvent) -> PushResult {
        let uid = match generate_uid(&self.user_id, event) {
            Ok(uid) => uid,
            Err(e) => return PushResult::failed(e.to_string()),
        };

        let request = self
            .authed(Method::PUT, &self.resource_url(&uid))
            .header(CONTENT_TYPE, "text/calendar; charset=utf-8")
            .body(render_event(&uid, event, Utc::now()));

        match self.http.send(&self.limiter, request).await.and_then(|r| r.error_for_status()) {
            Ok(_) => PushResult::ok(uid),
            Err(e) => {
                debug!(event_id = %event.id, error = %e, "CalDAV PUT failed");
                PushResult::failed(e.to_string())
            }
        }
    }

    async fn delete_one(&self, uid: &str) -> DeleteResult {
        let request = self.authed(Method::DELETE, &self.resource_url(uid));
        match self.http.send(&self.limiter, request).await.and_then(|r| r.error_for_status()) {
            Ok(_) | Err(BusySyncError::NotFound(_)) => DeleteResult::ok(),
            Err(e) => DeleteResult::failed(e.to_string()),
        }
    }
}

#[async_trait]
impl CalendarDestination for CalDavDestination {
    fn destination_id(&self) -> &str {
        &self.destination_id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn provider_kind(&self) -> ProviderKind {
        self.profile.kind
    }

    #[instrument(skip(self, events), fields(destination_id = %self.destination_id, provider = self.profile.display_name))]
    async fn push_events(&self, events: &[CanonicalEvent]) -> Result<Vec<PushResult>> {
        Ok(join_all(events.iter().map(|event| self.push_one(event))).await)
    }

    #[instrument(skip(self, uids), fields(destination_id = %self.destination_id, provider = self.profile.display_name))]
    async fn delete_events(&self, uids: &[String]) -> Result<Vec<DeleteResult>> {
        Ok(join_all(uids.iter().map(|uid| self.delete_one(uid))).await)
    }

    #[instrument(skip(self), fields(destination_id = %self.destination_id, provider = self.profile.display_name))]
    async fn list_remote_events(&self, options: ListOptions) -> Result<Vec<RemoteEvent>> {
        let report = Method::from_bytes(b"REPORT")
            .map_err(|e| BusySyncError::Internal(format!("invalid HTTP method: {e}")))?;
        let request = self
            .authed(report, &self.collection_url)
            .header("Depth", "1")
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(calendar_query(options.from, options.until));

        let response = self.http.send(&self.limiter, request).await?.error_for_status()?;
        let mut events = Vec::new();
        for data in parse_calendar_data(&response.body)? {
            match parse_remote_events(&data) {
                Ok(parsed) => events.extend(parsed.into_iter().filter(|e| is_owned_identifier(&e.uid))),
                Err(e) => warn!(error = %e, "Skipping unparseable calendar resource"),
            }
        }

        debug!(count = events.len(), "Listed owned CalDAV events");
        Ok(events)
    }
}

/// `calendar-query` REPORT body restricted to `[from, until)`.
fn calendar_query(from: DateTime<Utc>, until: DateTime<Utc>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <D:prop>
        <D:getetag/>
        <C:calendar-data/>
    </D:prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT">
                <C:time-range start="{}" end="{}"/>
            </C:comp-filter>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#,
        from.format(CALDAV_TIME_FORMAT),
        until.format(CALDAV_TIME_FORMAT)
    )
}

/// `calendar-data` payloads of a multistatus response.
fn parse_calendar_data(body: &str) -> Result<Vec<String>> {
    let doc = roxmltree::Document::parse(body)
        .map_err(|e| BusySyncError::Validation(format!("invalid multistatus XML: {e}")))?;

    Ok(doc
        .root_element()
        .descendants()
        .filter(|n| n.tag_name().name() == "response")
        .filter_map(|response| {
            response
                .descendants()
                .find(|n| n.tag_name().name() == "calendar-data")
                .and_then(|n| n.text())
                .map(str::to_string)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn calendar_query_carries_time_range() {
        let body = calendar_query(
            Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
        );
        assert!(body.contains(r#"<C:time-range start="20260302T000000Z" end="20260601T000000Z"/>"#));
    }

    #[test]
    fn multistatus_without_calendar_data_is_skipped() {
        let body = r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:" xmlns:cal="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/cal/a.ics</d:href>
    <d:propstat><d:prop><d:getetag>"1"</d:getetag><cal:calendar-data>BEGIN:VCALENDAR
END:VCALENDAR</cal:calendar-data></d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/cal/</d:href>
    <d:propstat><d:prop><d:getetag>"2"</d:getetag></d:prop></d:propstat>
  </d:response>
</d:multistatus>"#;

        let data = parse_calendar_data(body).unwrap();
        assert_eq!(data.len(), 1);
        assert!(data[0].starts_with("BEGIN:VCALENDAR"));
    }

    #[test]
    fn relative_calendar_path_needs_a_server() {
        let profile = CalDavProfile::for_kind(ProviderKind::Nextcloud).unwrap();
        let result = CalDavDestination::new(
            "d",
            "u",
            profile,
            "/remote.php/dav/calendars/me/busy",
            CalDavLogin { username: "me".into(), password: "pw".into() },
            HttpClient::new().unwrap(),
            Arc::new(RateLimiter::with_defaults()),
        );
        assert!(matches!(result, Err(BusySyncError::Validation(_))));
    }
}
