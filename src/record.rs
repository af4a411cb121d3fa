//! Record types flowing through the pipeline
//!
//! Raw records come in, aggregated and low-volume records are produced by the
//! summarizer, and both are folded into `UnifiedRecord` so the deduplicator and
//! serializer see a single schema.

use crate::timestamp::TimeBucket;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One row of the input event log
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawRecord {
    pub timestamp: String,
    pub device_id: String,
    pub event_type: String,
    pub payload: String,
}

impl RawRecord {
    pub fn new(
        timestamp: impl Into<String>,
        device_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            device_id: device_id.into(),
            event_type: event_type.into(),
            payload: payload.into(),
        }
    }
}

/// A rare event passed through without aggregation. The timestamp is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowVolumeRecord {
    pub device_id: String,
    pub event_type: String,
    pub payload: String,
}

impl From<&RawRecord> for LowVolumeRecord {
    fn from(raw: &RawRecord) -> Self {
        Self {
            device_id: raw.device_id.clone(),
            event_type: raw.event_type.clone(),
            payload: raw.payload.clone(),
        }
    }
}

/// Count of high-volume events for one device within one time bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedRecord {
    pub bucket: TimeBucket,
    pub device_id: String,
    /// Always >= 1
    pub total_pings: u64,
}

/// The `total_pings` column: a ping count for aggregated rows, the original
/// event type for pass-through rows
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PingsOrType {
    PingCount(u64),
    EventType(String),
}

impl fmt::Display for PingsOrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PingsOrType::PingCount(n) => write!(f, "{}", n),
            PingsOrType::EventType(s) => f.write_str(s),
        }
    }
}

/// Shared schema for aggregated and pass-through rows.
///
/// `bucket` is set exactly when `total_pings_or_type` is a `PingCount`;
/// `payload_content` is empty for aggregated rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedRecord {
    pub bucket: Option<TimeBucket>,
    pub device_id: String,
    pub total_pings_or_type: PingsOrType,
    pub payload_content: String,
}

impl UnifiedRecord {
    pub fn is_aggregated(&self) -> bool {
        matches!(self.total_pings_or_type, PingsOrType::PingCount(_))
    }

    pub fn ping_count(&self) -> Option<u64> {
        match self.total_pings_or_type {
            PingsOrType::PingCount(n) => Some(n),
            PingsOrType::EventType(_) => None,
        }
    }
}

impl From<AggregatedRecord> for UnifiedRecord {
    fn from(agg: AggregatedRecord) -> Self {
        Self {
            bucket: Some(agg.bucket),
            device_id: agg.device_id,
            total_pings_or_type: PingsOrType::PingCount(agg.total_pings),
            payload_content: String::new(),
        }
    }
}

impl From<LowVolumeRecord> for UnifiedRecord {
    fn from(low: LowVolumeRecord) -> Self {
        Self {
            bucket: None,
            device_id: low.device_id,
            total_pings_or_type: PingsOrType::EventType(low.event_type),
            payload_content: low.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Granularity;
    use crate::timestamp::Timestamp;

    #[test]
    fn test_unified_from_aggregated() {
        let bucket = Timestamp::parse("2023-01-01T00:10:00").unwrap().bucket(Granularity::Hour);
        let unified = UnifiedRecord::from(AggregatedRecord {
            bucket,
            device_id: "dev_1".to_string(),
            total_pings: 7,
        });
        assert!(unified.is_aggregated());
        assert_eq!(unified.ping_count(), Some(7));
        assert_eq!(unified.bucket, Some(bucket));
        assert_eq!(unified.payload_content, "");
    }

    #[test]
    fn test_unified_from_low_volume() {
        let raw = RawRecord::new("2023-01-01T00:10:00", "dev_2", "user_action", "clicked");
        let unified = UnifiedRecord::from(LowVolumeRecord::from(&raw));
        assert!(!unified.is_aggregated());
        assert_eq!(unified.bucket, None);
        assert_eq!(unified.total_pings_or_type, PingsOrType::EventType("user_action".to_string()));
        assert_eq!(unified.payload_content, "clicked");
    }

    #[test]
    fn test_tag_distinguishes_lookalikes() {
        assert_ne!(PingsOrType::PingCount(5), PingsOrType::EventType("5".to_string()));
        assert_eq!(PingsOrType::PingCount(5).to_string(), PingsOrType::EventType("5".to_string()).to_string());
    }
}
