//! DSOP - Data Stream Optimization Pipeline
//!
//! Batch reduction of telemetry event logs in three layers:
//! - Summarization: high-volume events are counted per time bucket and device,
//!   low-volume events pass through without their timestamp
//! - Deduplication: stable keep-first over a configurable key
//! - Compression: canonical delimited text through zlib, gzip or zstd

pub mod config;
pub mod error;
pub mod timestamp;
pub mod record;
pub mod raw_log;
pub mod summarizer;
pub mod dedup;
pub mod encoder;
pub mod decoder;
pub mod generator;
pub mod pipeline;

// Re-export main types
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineOutput, PipelineReport};
pub use record::{PingsOrType, RawRecord, UnifiedRecord};
