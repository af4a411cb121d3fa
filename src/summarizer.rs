//! Partitioner + Summarizer (layer 1)
//!
//! Routes every raw record to exactly one of two partitions:
//! - high-volume events are counted per `(bucket, device_id)`
//! - low-volume events pass through unchanged apart from losing the timestamp
//!
//! Output is aggregated rows sorted by `(bucket, device_id)` followed by
//! low-volume rows in input order. The deduplicator's keep-first rule
//! depends on this order.

use crate::config::{Granularity, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::record::{AggregatedRecord, LowVolumeRecord, RawRecord, UnifiedRecord};
use crate::timestamp::Timestamp;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// A raw record with its timestamp already validated
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    pub record: &'a RawRecord,
    pub timestamp: Timestamp,
}

impl<'a> Event<'a> {
    /// `number` is the 1-based record number reported on failure
    pub fn parse(number: u64, record: &'a RawRecord) -> Result<Self> {
        let timestamp = Timestamp::parse(&record.timestamp)
            .map_err(|reason| PipelineError::malformed(number, reason))?;
        Ok(Self { record, timestamp })
    }
}

/// Result of layer 1
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub records: Vec<UnifiedRecord>,
    pub high_volume_count: usize,
    pub low_volume_count: usize,
    pub aggregated_count: usize,
}

pub struct Summarizer {
    high_volume_event_types: BTreeSet<String>,
    granularity: Granularity,
}

impl Summarizer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            high_volume_event_types: config.high_volume_event_types.clone(),
            granularity: config.granularity,
        }
    }

    pub fn is_high_volume(&self, record: &RawRecord) -> bool {
        self.high_volume_event_types.contains(&record.event_type)
    }

    /// Run layer 1 over the whole batch.
    ///
    /// Every timestamp is validated before anything is aggregated, so a single
    /// malformed record fails the batch with no partial output.
    pub fn summarize(&self, records: &[RawRecord]) -> Result<Summary> {
        let events = records
            .iter()
            .enumerate()
            .map(|(i, record)| Event::parse(i as u64 + 1, record))
            .collect::<Result<Vec<_>>>()?;

        let (high_volume, low_volume) = partition(events, |r| self.is_high_volume(r));

        let aggregated = aggregate(&high_volume, self.granularity);
        info!(
            "Summarized {} high-volume records into {} aggregated records",
            high_volume.len(),
            aggregated.len()
        );

        let aggregated_count = aggregated.len();
        let mut unified: Vec<UnifiedRecord> = Vec::with_capacity(aggregated_count + low_volume.len());
        unified.extend(aggregated.into_iter().map(UnifiedRecord::from));
        unified.extend(pass_through(&low_volume));

        Ok(Summary {
            records: unified,
            high_volume_count: high_volume.len(),
            low_volume_count: low_volume.len(),
            aggregated_count,
        })
    }
}

/// Split events into (high-volume, low-volume). Total and disjoint; each side keeps input order.
pub fn partition<'a, P>(events: Vec<Event<'a>>, is_high_volume: P) -> (Vec<Event<'a>>, Vec<Event<'a>>)
where
    P: Fn(&RawRecord) -> bool,
{
    events.into_iter().partition(|e| is_high_volume(e.record))
}

/// Count events per `(bucket, device_id)`, sorted by that pair
pub fn aggregate(events: &[Event<'_>], granularity: Granularity) -> Vec<AggregatedRecord> {
    let mut counts: BTreeMap<_, u64> = BTreeMap::new();
    for event in events {
        let key = (event.timestamp.bucket(granularity), event.record.device_id.as_str());
        *counts.entry(key).or_default() += 1;
    }

    debug!("{} distinct (bucket, device) groups at {} granularity", counts.len(), granularity);

    counts
        .into_iter()
        .map(|((bucket, device_id), total_pings)| AggregatedRecord {
            bucket,
            device_id: device_id.to_string(),
            total_pings,
        })
        .collect()
}

/// One unified row per low-volume event, input order preserved
pub fn pass_through(events: &[Event<'_>]) -> Vec<UnifiedRecord> {
    events
        .iter()
        .map(|e| UnifiedRecord::from(LowVolumeRecord::from(e.record)))
        .collect()
}
