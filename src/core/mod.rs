//! Core types: errors, configuration, shared helpers.

pub mod config;
pub mod errors;

/// Current UTC time as RFC 3339 with millisecond precision.
#[must_use]
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
