//! Deduplicator (layer 2)
//!
//! Stable keep-first deduplication over the unified record sequence.
//! Single pass, O(n) time, O(distinct keys) extra space.

use crate::config::{DedupField, PipelineConfig};
use crate::record::{PingsOrType, UnifiedRecord};
use crate::timestamp::TimeBucket;
use std::collections::HashSet;
use tracing::info;

/// One component of a dedup key, borrowed from the record it was taken from.
/// Empty strings are ordinary values, not wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart<'a> {
    Bucket(Option<TimeBucket>),
    Text(&'a str),
    PingCount(u64),
    EventType(&'a str),
}

pub struct Deduplicator {
    key: Vec<DedupField>,
}

impl Deduplicator {
    pub fn new(key: Vec<DedupField>) -> Self {
        Self { key }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.dedup_key.clone())
    }

    fn key_of<'a>(&self, record: &'a UnifiedRecord) -> Vec<KeyPart<'a>> {
        self.key
            .iter()
            .map(|field| match field {
                DedupField::Bucket => KeyPart::Bucket(record.bucket),
                DedupField::DeviceId => KeyPart::Text(&record.device_id),
                DedupField::TotalPingsOrType => match &record.total_pings_or_type {
                    PingsOrType::PingCount(n) => KeyPart::PingCount(*n),
                    PingsOrType::EventType(s) => KeyPart::EventType(s),
                },
                DedupField::PayloadContent => KeyPart::Text(&record.payload_content),
            })
            .collect()
    }

    /// Keep the first record for every distinct key, preserving relative order.
    /// With an empty key every record is a duplicate of the first.
    pub fn dedup(&self, records: Vec<UnifiedRecord>) -> Vec<UnifiedRecord> {
        let before = records.len();

        let keep: Vec<bool> = {
            let mut seen = HashSet::with_capacity(records.len());
            records.iter().map(|r| seen.insert(self.key_of(r))).collect()
        };

        let deduped: Vec<UnifiedRecord> = records
            .into_iter()
            .zip(keep)
            .filter_map(|(record, keep)| keep.then_some(record))
            .collect();

        let columns: Vec<&str> = self.key.iter().map(|f| f.column()).collect();
        info!(
            "Deduplicated {} records down to {} on ({})",
            before,
            deduped.len(),
            columns.join(", ")
        );
        deduped
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}
