//! Destination adapters, one per provider family

pub mod caldav;
pub mod google;
pub mod microsoft;

pub use caldav::CalDavDestination;
pub use google::GoogleCalendarDestination;
pub use microsoft::MicrosoftCalendarDestination;

use busysync_domain::{BusySyncError, Credentials, DestinationConfig, Result};

/// OAuth calendar id of `config`, or a validation error for other credentials.
fn oauth_calendar_id(config: &DestinationConfig) -> Result<String> {
    match &config.credentials {
        Credentials::OAuth { calendar_id, .. } => Ok(calendar_id.clone()),
        Credentials::CalDav { .. } => Err(BusySyncError::Validation(format!(
            "{} destination {} has CalDAV credentials",
            config.provider_kind, config.destination_id
        ))),
    }
}
