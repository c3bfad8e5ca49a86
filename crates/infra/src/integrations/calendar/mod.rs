//! Calendar destination integrations
//!
//! Adapters implementing `busysync_core::CalendarDestination` for Google,
//! Microsoft Graph and CalDAV servers, the factory that builds them, OAuth
//! refresh clients and iCalendar helpers.

pub mod factory;
pub mod ics;
pub mod oauth;
pub mod providers;

pub use factory::ProviderDestinationFactory;
pub use ics::{parse_remote_events, render_event};
pub use oauth::RefreshTokenClient;
pub use providers::{CalDavDestination, GoogleCalendarDestination, MicrosoftCalendarDestination};
