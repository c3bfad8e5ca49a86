//! Shared test helpers for `busysync-core` integration tests.
//!
//! In-memory port implementations so orchestration tests can focus on
//! behaviour instead of boilerplate.

#![allow(dead_code)]

pub mod calendar;
pub mod repositories;

use busysync_domain::{CanonicalEvent, Credentials, DestinationConfig, ProviderKind};
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Start of today plus `hours`.
pub fn today_at(hours: i64) -> DateTime<Utc> {
    let now = Utc::now();
    Utc.from_utc_datetime(&now.date_naive().and_hms_opt(0, 0, 0).unwrap()) + Duration::hours(hours)
}

pub fn event(id: &str, start_hour: i64) -> CanonicalEvent {
    CanonicalEvent {
        id: id.to_string(),
        start_time: today_at(start_hour),
        end_time: today_at(start_hour) + Duration::minutes(30),
        summary: "Busy".to_string(),
        description: None,
        source_id: "source-1".to_string(),
        source_name: Some("Work".to_string()),
    }
}

pub fn caldav_config(user_id: &str, destination_id: &str, kind: ProviderKind) -> DestinationConfig {
    DestinationConfig {
        destination_id: destination_id.to_string(),
        user_id: user_id.to_string(),
        provider_kind: kind,
        credentials: Credentials::CalDav {
            calendar_url: format!("https://dav.example.com/{destination_id}/"),
            username: "me".to_string(),
            encrypted_password: "c2VjcmV0".to_string(),
        },
    }
}
