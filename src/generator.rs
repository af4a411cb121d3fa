//! Synthetic telemetry producer
//!
//! Emits a heartbeat-dominated event log: most records are `ping`/`OK`, the
//! rest are rare events with near-unique payloads, and a fixed stride of
//! records carries a shared payload so deduplication has something to remove.

use crate::record::RawRecord;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub const LOW_VOLUME_EVENT_TYPES: &[&str] = &["critical_error", "user_action"];
pub const DUPLICATE_PAYLOAD: &str = "duplicate_payload";

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub records: usize,
    /// Device ids are `dev_1..=dev_{devices}`
    pub devices: u32,
    /// Share of records that are pings (default 0.9)
    pub high_volume_ratio: f64,
    /// Spacing between consecutive timestamps (default 100ms)
    pub interval: TimeDelta,
    /// Every n-th record gets `DUPLICATE_PAYLOAD`; 0 disables
    pub duplicate_every: usize,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            records: 100_000,
            devices: 100,
            high_volume_ratio: 0.9,
            interval: TimeDelta::milliseconds(100),
            duplicate_every: 1000,
            seed: 42,
        }
    }
}

pub fn generate_records(config: &GeneratorConfig) -> Vec<RawRecord> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let start = start_time();
    let devices = config.devices.max(1);

    (0..config.records)
        .map(|i| {
            let timestamp = start + config.interval * i as i32;
            let device_id = rng.gen_range(1..=devices);

            let (event_type, mut payload) = if rng.gen::<f64>() < config.high_volume_ratio {
                ("ping", "OK".to_string())
            } else {
                let event_type = LOW_VOLUME_EVENT_TYPES.choose(&mut rng).copied().unwrap_or("user_action");
                (event_type, format!("unique_event_{}", rng.gen_range(1000..=9999)))
            };

            if config.duplicate_every > 0 && i % config.duplicate_every == 0 {
                payload = DUPLICATE_PAYLOAD.to_string();
            }

            RawRecord::new(isoformat(timestamp), format!("dev_{}", device_id), event_type, payload)
        })
        .collect()
}

fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Seconds precision when there is no sub-second part, microseconds otherwise
fn isoformat(ts: NaiveDateTime) -> String {
    if ts.nanosecond() == 0 {
        ts.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}
