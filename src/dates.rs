//! Timestamp normalisation.
//!
//! Dates reach the pipeline from CSV cells, CLI flags and query strings in a
//! handful of ISO-like spellings. Every caller goes through [`parse_timestamp`],
//! which tries an explicit list of patterns and reports failure instead of
//! guessing; the caller decides what to do with an unparseable value.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use thiserror::Error;

/// Date-time patterns accepted by [`parse_timestamp`], tried in order.
pub const DATETIME_PATTERNS: [&str; 4] = [
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Date-only pattern; such values map to midnight.
pub const DATE_PATTERN: &str = "%Y-%m-%d";

/// Canonical textual form of a `longdate` (used for persistence).
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised timestamp '{input}' (expected YYYY-MM-DD[ HH:MM[:SS[.fff]]], 'T' separator allowed)")]
pub struct ParseError {
    pub input: String,
}

/// Parse a naive timestamp from one of the accepted patterns.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, ParseError> {
    let s = raw.trim();
    for fmt in DATETIME_PATTERNS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, DATE_PATTERN) {
        return Ok(d.and_time(NaiveTime::MIN));
    }
    Err(ParseError {
        input: raw.to_string(),
    })
}

/// Parse a timestamp that may carry a UTC offset.
///
/// The offset is dropped and the wall-clock part kept: all feeds are exported
/// in the same zone, so the wall clock is already the canonical one.
pub fn parse_zoned_timestamp(raw: &str) -> Result<NaiveDateTime, ParseError> {
    let s = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.naive_local());
    }
    if let Ok(ts) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Ok(ts.naive_local());
    }
    parse_timestamp(s)
}

/// Truncate a timestamp to the start of its hour.
pub fn floor_hour(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date()
        .and_hms_opt(ts.hour(), 0, 0)
        .unwrap_or(ts)
}

pub fn is_hour_aligned(ts: NaiveDateTime) -> bool {
    ts.minute() == 0 && ts.second() == 0 && ts.nanosecond() == 0
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(CANONICAL_FORMAT).to_string()
}

/// End of a window of `days` days starting at `start`; `None` past the
/// calendar's range.
pub fn days_after(start: NaiveDateTime, days: u32) -> Option<NaiveDateTime> {
    Duration::try_days(i64::from(days)).and_then(|d| start.checked_add_signed(d))
}
