//! Error taxonomy surfaced to the pipeline caller

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unparsable or missing field in an input record. Aborts the run.
    /// `record` is the 1-based data record number (header excluded, 0 for the header itself).
    #[error("malformed record {record}: {reason}")]
    MalformedRecord { record: u64, reason: String },

    /// Field content the serializer cannot represent. Raised before compression.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The underlying compressor failed. There is no uncompressed fallback.
    #[error("compression failed: {0}")]
    Compression(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PipelineError {
    pub fn malformed(record: u64, reason: impl Into<String>) -> Self {
        PipelineError::MalformedRecord {
            record,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
