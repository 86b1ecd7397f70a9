//! Upload timestamp helpers.
//!
//! Timestamps are stored as RFC 3339 / ISO-8601 strings in UTC with a fixed
//! number of fractional digits, so that string order equals time order.

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;

/// Default display format for the listing page.
pub const DISPLAY_FORMAT: &str = "%Y/%m/%d %H:%M";

/// Render a UTC instant as a stored timestamp string.
pub fn to_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The current time as a stored timestamp string.
pub fn now_timestamp() -> String {
    to_timestamp(&Utc::now())
}

/// Format a stored timestamp in the specified timezone.
///
/// Returns the original string if either the timezone or the timestamp
/// cannot be parsed.
pub fn format_timestamp(timestamp: &str, timezone: &str, format: &str) -> String {
    let tz: Tz = match timezone.parse() {
        Ok(tz) => tz,
        Err(_) => return timestamp.to_string(),
    };

    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(dt) => dt.with_timezone(&tz).format(format).to_string(),
        Err(_) => timestamp.to_string(),
    }
}

/// Format a stored timestamp with [`DISPLAY_FORMAT`].
pub fn format_timestamp_default(timestamp: &str, timezone: &str) -> String {
    format_timestamp(timestamp, timezone, DISPLAY_FORMAT)
}
