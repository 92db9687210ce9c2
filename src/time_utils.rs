// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and clock-derived ids.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Client-generated track id: milliseconds since the Unix epoch.
pub fn clock_id(now: DateTime<Utc>) -> u64 {
    now.timestamp_millis().max(0) as u64
}

/// Default track name, e.g. "Dog - 14:03:12".
pub fn default_track_name(label: &str, now: DateTime<Utc>) -> String {
    format!("{} - {}", label, now.format("%H:%M:%S"))
}

/// Parse a timestamp from the remote store.
///
/// Accepts RFC3339 and offset-less ISO 8601, which is taken as UTC.
pub fn parse_remote_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_uses_z_suffix() {
        let date = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap();
        assert_eq!(format_utc_rfc3339(date), "2025-06-01T12:30:00.000Z");
    }

    #[test]
    fn test_clock_id_is_epoch_millis() {
        let date = Utc.timestamp_millis_opt(1000).unwrap();
        assert_eq!(clock_id(date), 1000);
    }

    #[test]
    fn test_parse_remote_timestamp() {
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_remote_timestamp("2025-06-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_remote_timestamp("2025-06-01T14:30:00+02:00"), Some(expected));
        assert_eq!(
            parse_remote_timestamp("2025-06-01T12:30:00.250000"),
            Some(expected + chrono::Duration::milliseconds(250))
        );
        assert_eq!(parse_remote_timestamp("yesterday"), None);
    }

    #[test]
    fn test_default_track_name() {
        let date = Utc.with_ymd_and_hms(2025, 6, 1, 8, 5, 9).unwrap();
        assert_eq!(default_track_name("Human", date), "Human - 08:05:09");
    }
}
