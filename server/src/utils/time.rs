//! Time utility functions and the injectable clock

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use parking_lot::Mutex;

/// Source of the current time.
///
/// Services take an `Arc<dyn Clock>` so cooldowns and row timestamps can be
/// driven deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    pub fn set(&self, value: DateTime<Utc>) {
        *self.now.lock() = value;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Convert milliseconds since Unix epoch to DateTime<Utc>
pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(|| {
        tracing::warn!(millis, "Invalid timestamp, using epoch");
        DateTime::UNIX_EPOCH
    })
}

/// Which end of an inclusive range a bound belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    Start,
    End,
}

/// Parse a date-range bound.
///
/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (read as UTC) or a bare
/// `YYYY-MM-DD`. A bare end date covers the whole day.
pub fn parse_range_bound(value: &str, bound: RangeBound) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let time = match bound {
        RangeBound::Start => NaiveTime::MIN,
        RangeBound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?,
    };
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(chrono::Duration::hours(25));
        assert_eq!(clock.now().day(), 2);
        assert_eq!(clock.now().hour(), 9);
        assert_eq!(clock.now_millis(), start.timestamp_millis() + 25 * 3_600_000);
    }

    #[test]
    fn test_millis_to_datetime_roundtrip() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(millis_to_datetime(dt.timestamp_millis()), dt);
    }

    #[test]
    fn test_parse_range_bound_rfc3339() {
        let dt = parse_range_bound("2025-01-02T03:04:05+02:00", RangeBound::Start).unwrap();
        assert_eq!(dt.hour(), 1);
    }

    #[test]
    fn test_parse_range_bound_date_only() {
        let start = parse_range_bound("2025-01-02", RangeBound::Start).unwrap();
        let end = parse_range_bound("2025-01-02", RangeBound::End).unwrap();
        assert_eq!((start.hour(), start.minute()), (0, 0));
        assert_eq!((end.hour(), end.minute(), end.second()), (23, 59, 59));
        assert_eq!(end.timestamp_millis() - start.timestamp_millis(), 86_399_999);
    }

    #[test]
    fn test_parse_range_bound_naive() {
        let dt = parse_range_bound("2025-01-02T10:00:00", RangeBound::End).unwrap();
        assert_eq!(dt.hour(), 10);
    }

    #[test]
    fn test_parse_range_bound_invalid() {
        assert!(parse_range_bound("yesterday", RangeBound::Start).is_none());
        assert!(parse_range_bound("", RangeBound::Start).is_none());
        assert!(parse_range_bound("2025-13-01", RangeBound::End).is_none());
    }
}
