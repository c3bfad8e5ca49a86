//! iCalendar rendering and parsing
//!
//! Mirrored events are always written with UTC times. Parsing accepts the
//! other `DTSTART` forms so events edited by other clients still list:
//! `TZID` times are converted through the IANA database, dates and floating
//! times are read as UTC.

use busysync_domain::{BusySyncError, CanonicalEvent, RemoteEvent, Result};
use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::parser::{
    read_calendar, unfold, Calendar as ParsedCalendar, Component as ParsedComponent,
};
use icalendar::{Calendar, CalendarDateTime, Component, DatePerhapsTime};
use tracing::debug;

const ICS_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Render one mirrored event as a `VCALENDAR` document.
pub fn render_event(uid: &str, event: &CanonicalEvent, stamp: DateTime<Utc>) -> String {
    let mut ics_event = icalendar::Event::new();
    ics_event.uid(uid);
    ics_event.summary(&event.summary);
    ics_event.add_property("DTSTAMP", stamp.format(ICS_TIME_FORMAT).to_string());
    ics_event.add_property("DTSTART", event.start_time.format(ICS_TIME_FORMAT).to_string());
    ics_event.add_property("DTEND", event.end_time.format(ICS_TIME_FORMAT).to_string());
    ics_event.add_property("TRANSP", "OPAQUE");
    if let Some(description) = &event.description {
        ics_event.description(description);
    }

    let mut calendar = Calendar::new();
    calendar.push(ics_event.done());
    calendar.done().to_string()
}

/// Every `VEVENT` with a `UID` and a start, as a remote event.
///
/// # Errors
/// Returns `BusySyncError::Validation` when the document is not iCalendar.
pub fn parse_remote_events(content: &str) -> Result<Vec<RemoteEvent>> {
    let unfolded = unfold(content);
    let calendar = parse_document(&unfolded)?;

    Ok(calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(|vevent| {
            let uid = vevent.find_prop("UID")?.val.to_string();
            let (start_time, end_time) = event_bounds(vevent)?;
            Some(RemoteEvent { uid, start_time, end_time })
        })
        .collect())
}

fn parse_document(unfolded: &str) -> Result<ParsedCalendar<'_>> {
    if !unfolded.trim_start().starts_with("BEGIN:VCALENDAR") {
        return Err(BusySyncError::Validation("missing BEGIN:VCALENDAR".to_string()));
    }
    read_calendar(unfolded)
        .map_err(|e| BusySyncError::Validation(format!("invalid iCalendar data: {e}")))
}

fn event_bounds(vevent: &ParsedComponent<'_>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = to_utc(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);
    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map_or(start, to_utc);
    Some((start, end.max(start)))
}

fn to_utc(value: DatePerhapsTime) -> DateTime<Utc> {
    match value {
        DatePerhapsTime::Date(date) => date.and_time(NaiveTime::default()).and_utc(),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => dt,
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => naive.and_utc(),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            zoned_to_utc(date_time, &tzid)
        }
    }
}

/// Wall time in `tzid`. Unknown zones are read as UTC; a time skipped by a
/// DST jump resolves to the instant an hour later.
fn zoned_to_utc(date_time: NaiveDateTime, tzid: &str) -> DateTime<Utc> {
    let Ok(tz) = tzid.parse::<Tz>() else {
        debug!(tzid, "Unknown TZID, reading local time as UTC");
        return date_time.and_utc();
    };
    tz.from_local_datetime(&date_time)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(date_time + chrono::Duration::hours(1))).earliest())
        .map_or_else(|| date_time.and_utc(), |local| local.with_timezone(&Utc))
}
