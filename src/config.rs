//! Configuration for the DSOP pipeline

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Column layout of the raw event log
pub const RAW_HEADER: [&str; 4] = ["timestamp", "device_id", "event_type", "payload"];

/// Column layout of the processed artifact.
/// `total_pings` keeps its name although low-volume rows store the event type there.
pub const PROCESSED_HEADER: [&str; 4] = ["hour", "device_id", "total_pings", "payload_content"];

pub const FIELD_DELIMITER: u8 = b',';
pub const RECORD_TERMINATOR: u8 = b'\n';
pub const QUOTE: u8 = b'"';

/// Event type treated as high-volume when nothing else is configured
pub const DEFAULT_HIGH_VOLUME_EVENT: &str = "ping";

/// Leading bytes used to recognise a compressed artifact
pub const ZLIB_MAGIC: u8 = 0x78;
pub const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
pub const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];

/// Width of the time bucket high-volume events are counted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    Minute,
    #[default]
    Hour,
    Day,
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minute" | "m" => Ok(Granularity::Minute),
            "hour" | "h" => Ok(Granularity::Hour),
            "day" | "d" => Ok(Granularity::Day),
            other => Err(format!("unknown granularity '{}' (expected minute, hour or day)", other)),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        };
        f.write_str(name)
    }
}

/// A field of the unified record that can take part in the dedup key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DedupField {
    Bucket,
    DeviceId,
    TotalPingsOrType,
    PayloadContent,
}

impl DedupField {
    /// Column name in the processed artifact
    pub fn column(&self) -> &'static str {
        match self {
            DedupField::Bucket => PROCESSED_HEADER[0],
            DedupField::DeviceId => PROCESSED_HEADER[1],
            DedupField::TotalPingsOrType => PROCESSED_HEADER[2],
            DedupField::PayloadContent => PROCESSED_HEADER[3],
        }
    }
}

impl FromStr for DedupField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "hour" | "bucket" => Ok(DedupField::Bucket),
            "device_id" => Ok(DedupField::DeviceId),
            "total_pings" | "total_pings_or_type" => Ok(DedupField::TotalPingsOrType),
            "payload_content" => Ok(DedupField::PayloadContent),
            other => Err(format!("unknown dedup field '{}'", other)),
        }
    }
}

/// Byte-stream compressor applied to the processed artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    Zlib,
    Gzip,
    Zstd,
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zlib" | "deflate" => Ok(Codec::Zlib),
            "gzip" | "gz" => Ok(Codec::Gzip),
            "zstd" | "zst" => Ok(Codec::Zstd),
            other => Err(format!("unknown codec '{}' (expected zlib, gzip or zstd)", other)),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Codec::Zlib => "zlib",
            Codec::Gzip => "gzip",
            Codec::Zstd => "zstd",
        };
        f.write_str(name)
    }
}

/// How the serializer treats fields containing the delimiter, a quote or a line break
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotePolicy {
    /// Quote such fields (round-trips through any conforming reader)
    #[default]
    Necessary,
    /// Never quote; such fields are an encoding error
    Never,
}

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Event types routed to the aggregated (high-volume) partition
    pub high_volume_event_types: BTreeSet<String>,
    /// Bucket width for high-volume aggregation (default hour)
    pub granularity: Granularity,
    /// Fields whose equality defines a duplicate
    pub dedup_key: Vec<DedupField>,
    /// Compressor for the final artifact (default zlib)
    pub codec: Codec,
    /// Deflate level 0-9 for zlib/gzip (default 6)
    pub compression_level: u32,
    /// zstd compression level (default 3)
    pub zstd_level: i32,
    /// zstd long distance matching window log (default 27 = 128MB)
    pub zstd_window_log: u32,
    pub quote_policy: QuotePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            high_volume_event_types: BTreeSet::from([DEFAULT_HIGH_VOLUME_EVENT.to_string()]),
            granularity: Granularity::Hour,
            dedup_key: vec![
                DedupField::DeviceId,
                DedupField::TotalPingsOrType,
                DedupField::PayloadContent,
            ],
            codec: Codec::Zlib,
            compression_level: 6,
            zstd_level: 3,
            zstd_window_log: 27,
            quote_policy: QuotePolicy::Necessary,
        }
    }
}
