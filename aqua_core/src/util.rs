//! Device clock formatting helpers.

use chrono::{NaiveDateTime, Timelike};

/// Format the device uses for clock sync and status.
pub const DEVICE_TIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";
/// Format the device uses when stamping dose log entries.
pub const DEVICE_LOG_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Render `dt` as `dd/mm/yyyy hh:mm:ss`.
#[inline]
pub fn format_device_time(dt: NaiveDateTime) -> String {
    dt.format(DEVICE_TIME_FORMAT).to_string()
}

/// Parse `dd/mm/yyyy hh:mm:ss`, also accepting the seconds-less log form.
pub fn parse_device_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, DEVICE_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, DEVICE_LOG_FORMAT))
        .ok()
}

/// Minutes since midnight.
#[inline]
pub fn minutes_of_day(dt: NaiveDateTime) -> u32 {
    dt.hour() * 60 + dt.minute()
}
