//! ISO-8601 timestamp parsing and time bucketing
//!
//! Offsets are carried exactly as stated on the input. No timezone conversion
//! happens, so `10:15+02:00` and `08:15Z` land in different buckets.

use crate::config::Granularity;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    // 2023-10-15T14:30:00, 2023-10-15 14:30:00.123Z, 2023-10-15T14:30+02:00, ...
    static ref ISO_TIMESTAMP_RE: Regex = Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})[T ](\d{2}):(\d{2})(?::(\d{2})(?:\.(\d{1,9}))?)?(Z|[+-]\d{2}(?::?\d{2})?)?$"
    ).unwrap();

    // Rendered bucket: 2023-10-15 14:00 or 2023-10-15 14:00+02:00
    static ref BUCKET_RE: Regex = Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2}) (\d{2}):(\d{2})([+-]\d{2}:\d{2})?$"
    ).unwrap();
}

/// A parsed wall-clock timestamp with its stated UTC offset, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    local: NaiveDateTime,
    /// Seconds east of UTC; `None` when the input carried no offset
    offset_seconds: Option<i32>,
}

impl Timestamp {
    pub fn parse(s: &str) -> Result<Self, String> {
        let caps = ISO_TIMESTAMP_RE
            .captures(s.trim())
            .ok_or_else(|| format!("'{}' is not an ISO-8601 timestamp", s))?;

        let num = |i: usize| -> u32 {
            caps.get(i)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0)
        };

        let date = NaiveDate::from_ymd_opt(num(1) as i32, num(2), num(3))
            .ok_or_else(|| format!("'{}' has an invalid calendar date", s))?;

        let nanos = match caps.get(7) {
            Some(frac) => {
                // Pad to 9 digits
                let padded = format!("{:0<9}", frac.as_str());
                padded.parse::<u32>().unwrap_or(0)
            }
            None => 0,
        };
        let time = NaiveTime::from_hms_nano_opt(num(4), num(5), num(6), nanos)
            .ok_or_else(|| format!("'{}' has an invalid time of day", s))?;

        let offset_seconds = match caps.get(8) {
            Some(m) => Some(parse_offset(m.as_str()).ok_or_else(|| format!("'{}' has an invalid UTC offset", s))?),
            None => None,
        };

        Ok(Self {
            local: NaiveDateTime::new(date, time),
            offset_seconds,
        })
    }

    pub fn local(&self) -> NaiveDateTime {
        self.local
    }

    pub fn offset_seconds(&self) -> Option<i32> {
        self.offset_seconds
    }

    /// Floor to the start of the containing bucket, keeping the stated offset
    pub fn bucket(&self, granularity: Granularity) -> TimeBucket {
        let date = self.local.date();
        let floor = match granularity {
            Granularity::Minute => NaiveTime::from_hms_opt(self.local.hour(), self.local.minute(), 0),
            Granularity::Hour => NaiveTime::from_hms_opt(self.local.hour(), 0, 0),
            Granularity::Day => NaiveTime::from_hms_opt(0, 0, 0),
        };

        TimeBucket {
            start: floor.map(|t| date.and_time(t)).unwrap_or(self.local),
            offset_seconds: self.offset_seconds,
        }
    }
}

/// Start of an aggregation bucket.
///
/// Orders by local start time, then by offset (unstated offsets first), which
/// gives aggregated rows a stable order across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeBucket {
    start: NaiveDateTime,
    offset_seconds: Option<i32>,
}

impl TimeBucket {
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn offset_seconds(&self) -> Option<i32> {
        self.offset_seconds
    }

    /// Parse the rendering produced by `Display`
    pub fn parse(s: &str) -> Option<Self> {
        let caps = BUCKET_RE.captures(s)?;
        let num = |i: usize| -> Option<u32> { caps.get(i)?.as_str().parse().ok() };

        let date = NaiveDate::from_ymd_opt(num(1)? as i32, num(2)?, num(3)?)?;
        let time = NaiveTime::from_hms_opt(num(4)?, num(5)?, 0)?;
        let offset_seconds = match caps.get(6) {
            Some(m) => Some(parse_offset(m.as_str())?),
            None => None,
        };

        Some(Self {
            start: NaiveDateTime::new(date, time),
            offset_seconds,
        })
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start.format("%Y-%m-%d %H:%M"))?;
        if let Some(offset) = self.offset_seconds {
            let sign = if offset < 0 { '-' } else { '+' };
            let abs = offset.unsigned_abs();
            write!(f, "{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)?;
        }
        Ok(())
    }
}

/// `Z`, `+HH`, `+HHMM` or `+HH:MM` to seconds east of UTC
fn parse_offset(s: &str) -> Option<i32> {
    if s == "Z" {
        return Some(0);
    }

    let sign = match s.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits: String = s[1..].chars().filter(|c| *c != ':').collect();
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }

    Some(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_naive_isoformat() {
        let ts = Timestamp::parse("2023-01-01T00:16:40.100000").unwrap();
        assert_eq!(ts.offset_seconds(), None);
        assert_eq!(ts.local().minute(), 16);
        assert_eq!(ts.local().nanosecond(), 100_000_000);
    }

    #[test]
    fn test_parse_offsets() {
        assert_eq!(Timestamp::parse("2023-01-01T10:00:00Z").unwrap().offset_seconds(), Some(0));
        assert_eq!(Timestamp::parse("2023-01-01T10:00:00+05:30").unwrap().offset_seconds(), Some(19800));
        assert_eq!(Timestamp::parse("2023-01-01 10:00-0800").unwrap().offset_seconds(), Some(-28800));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(Timestamp::parse("yesterday").is_err());
        assert!(Timestamp::parse("2023-13-01T00:00:00").is_err());
        assert!(Timestamp::parse("2023-02-30T00:00:00").is_err());
        assert!(Timestamp::parse("2023-01-01T24:00:00").is_err());
        assert!(Timestamp::parse("2023-01-01T10:00:00+25:00").is_err());
        assert!(Timestamp::parse("").is_err());
    }

    #[test]
    fn test_hour_bucket_keeps_offset() {
        let ts = Timestamp::parse("2023-06-01T23:59:59.999+02:00").unwrap();
        let bucket = ts.bucket(Granularity::Hour);
        assert_eq!(bucket.to_string(), "2023-06-01 23:00+02:00");

        let naive = Timestamp::parse("2023-06-01T23:59:59").unwrap().bucket(Granularity::Hour);
        assert_eq!(naive.to_string(), "2023-06-01 23:00");
        assert_ne!(bucket, naive);
    }

    #[test]
    fn test_granularities() {
        let ts = Timestamp::parse("2023-06-01T13:47:12").unwrap();
        assert_eq!(ts.bucket(Granularity::Minute).to_string(), "2023-06-01 13:47");
        assert_eq!(ts.bucket(Granularity::Day).to_string(), "2023-06-01 00:00");
    }

    #[test]
    fn test_bucket_parses_back() {
        for s in ["2023-01-01T05:12:00", "2023-01-01T05:12:00Z", "2023-01-01T05:12:00-03:30"] {
            let bucket = Timestamp::parse(s).unwrap().bucket(Granularity::Hour);
            assert_eq!(TimeBucket::parse(&bucket.to_string()), Some(bucket));
        }
        assert_eq!(TimeBucket::parse("2023-01-01T05:00"), None);
    }

    #[test]
    fn test_bucket_order() {
        let a = Timestamp::parse("2023-01-01T05:00:00").unwrap().bucket(Granularity::Hour);
        let b = Timestamp::parse("2023-01-01T05:30:00Z").unwrap().bucket(Granularity::Hour);
        let c = Timestamp::parse("2023-01-01T06:00:00").unwrap().bucket(Granularity::Hour);
        let mut buckets = vec![c, b, a];
        buckets.sort();
        assert_eq!(buckets, vec![a, b, c]);
    }
}
