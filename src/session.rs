//! Broker session normalization
//!
//! The broker's trading day starts in the afternoon and runs into the early
//! morning of the next calendar date, but executions in the after-hours leg
//! are stamped with the *previous* day's date. A fill reported as
//! `2025/08/13 02:15:00` actually happened in the morning of 2025-08-14 and
//! counts as 2025-08-14 activity. Everything downstream (position splitting,
//! day bucketing, ordering) uses the corrected instant, never the raw
//! broker strings.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Clock hours in `[0, AFTER_HOURS_BOUNDARY_HOUR)` belong to the next
/// calendar day. The source material used two different boundaries in its
/// sort and normalization helpers; a single constant is used here for both.
pub const AFTER_HOURS_BOUNDARY_HOUR: u32 = 8;

const SECONDS_PER_DAY: i64 = 86_400;

/// Parse a broker-reported date string (`YYYY/MM/DD` or `YYYY-MM-DD`)
pub fn parse_broker_date(date: &str) -> Option<NaiveDate> {
    let date = date.trim();
    NaiveDate::parse_from_str(date, "%Y/%m/%d")
        .or_else(|_| NaiveDate::parse_from_str(date, "%Y-%m-%d"))
        .ok()
}

/// Parse a broker-reported time string (`HH:MM:SS`)
pub fn parse_broker_time(time: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(time.trim(), "%H:%M:%S").ok()
}

/// Literal instant exactly as the broker reported it, no session correction
pub fn literal_instant(date: &str, time: &str) -> Option<NaiveDateTime> {
    Some(parse_broker_date(date)?.and_time(parse_broker_time(time)?))
}

/// Wall-clock instant of an execution, correcting the broker's day stamping.
///
/// Returns `None` when the date or time does not parse; the caller drops or
/// fails that single record.
pub fn normalize(date: &str, time: &str) -> Option<NaiveDateTime> {
    normalize_with(date, time, AFTER_HOURS_BOUNDARY_HOUR)
}

/// `normalize` with an explicit boundary hour from configuration
pub fn normalize_with(date: &str, time: &str, boundary_hour: u32) -> Option<NaiveDateTime> {
    let literal = literal_instant(date, time)?;
    if literal.hour() < boundary_hour {
        Some(literal + Duration::days(1))
    } else {
        Some(literal)
    }
}

/// Monotonic ordering key for a broker-reported instant.
///
/// Epoch seconds of the literal instant, biased by +24h for the early-morning
/// after-hours window so a session sorts as one contiguous run. With a single
/// boundary hour this equals the normalized instant's epoch seconds; ties
/// between trades sharing a timestamp are broken by trade id downstream.
pub fn sort_key(literal: NaiveDateTime) -> i64 {
    sort_key_with(literal, AFTER_HOURS_BOUNDARY_HOUR)
}

/// `sort_key` with an explicit boundary hour from configuration
pub fn sort_key_with(literal: NaiveDateTime, boundary_hour: u32) -> i64 {
    let bias = if literal.hour() < boundary_hour {
        SECONDS_PER_DAY
    } else {
        0
    };
    literal.and_utc().timestamp() + bias
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_hours_unchanged() {
        let ts = normalize("2025/08/13", "10:30:00").unwrap();
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2025, 8, 13).unwrap());
        assert_eq!(ts.hour(), 10);
    }

    #[test]
    fn test_after_hours_shifts_to_next_day() {
        let ts = normalize("2025/08/13", "02:15:00").unwrap();
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2025, 8, 14).unwrap());
        // Clock time is preserved, only the date moves
        assert_eq!(ts.hour(), 2);
        assert_eq!(ts.minute(), 15);
    }

    #[test]
    fn test_boundary_hour_is_regular() {
        let ts = normalize("2025-08-13", "08:00:00").unwrap();
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2025, 8, 13).unwrap());
    }

    #[test]
    fn test_both_date_formats() {
        assert_eq!(
            normalize("2025/08/13", "10:00:00"),
            normalize("2025-08-13", "10:00:00")
        );
    }

    #[test]
    fn test_unparsable_input_is_none() {
        assert!(normalize("13/08/2025", "10:00:00").is_none());
        assert!(normalize("2025/08/13", "10:00").is_none());
        assert!(normalize("", "").is_none());
    }

    #[test]
    fn test_sort_key_matches_normalized_instant() {
        for (date, time) in [("2025/08/13", "02:15:00"), ("2025/08/13", "15:45:00")] {
            let literal = literal_instant(date, time).unwrap();
            let normalized = normalize(date, time).unwrap();
            assert_eq!(sort_key(literal), normalized.and_utc().timestamp());
        }
    }

    #[test]
    fn test_after_hours_sorts_after_day_session() {
        // 02:15 stamped on 08/13 happened after the 08/13 day session
        let day = literal_instant("2025/08/13", "15:30:00").unwrap();
        let after = literal_instant("2025/08/13", "02:15:00").unwrap();
        assert!(sort_key(after) > sort_key(day));
    }
}
