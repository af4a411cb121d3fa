//! Serializer + compressor (layer 3)
//!
//! The deduplicated records are rendered to delimited UTF-8 text with a fixed
//! header and field order, then the whole byte stream goes through a
//! general-purpose lossless compressor. The compressor knows nothing about
//! records; decompressing yields the serialized text byte for byte.

use crate::config::{
    Codec, PipelineConfig, QuotePolicy, FIELD_DELIMITER, PROCESSED_HEADER, QUOTE, RECORD_TERMINATOR,
};
use crate::error::{PipelineError, Result};
use crate::record::UnifiedRecord;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::io::Write;
use tracing::debug;

/// Render records as `hour,device_id,total_pings,payload_content` text.
///
/// The header row is always written, so an empty sequence serializes to the
/// header line alone.
pub fn serialize(records: &[UnifiedRecord], quote_policy: QuotePolicy) -> Result<Vec<u8>> {
    let quote_style = match quote_policy {
        QuotePolicy::Necessary => csv::QuoteStyle::Necessary,
        QuotePolicy::Never => csv::QuoteStyle::Never,
    };

    let mut writer = csv::WriterBuilder::new()
        .delimiter(FIELD_DELIMITER)
        .quote(QUOTE)
        .terminator(csv::Terminator::Any(RECORD_TERMINATOR))
        .quote_style(quote_style)
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(PROCESSED_HEADER).map_err(encoding_error)?;

    for (i, record) in records.iter().enumerate() {
        let bucket = record.bucket.map(|b| b.to_string()).unwrap_or_default();
        let pings_or_type = record.total_pings_or_type.to_string();
        let fields = [
            bucket.as_str(),
            record.device_id.as_str(),
            pings_or_type.as_str(),
            record.payload_content.as_str(),
        ];

        if quote_policy == QuotePolicy::Never {
            if let Some(field) = fields.iter().find(|f| needs_quoting(f)) {
                return Err(PipelineError::Encoding(format!(
                    "record {} field {:?} contains a delimiter, quote or line break and quoting is disabled",
                    i + 1,
                    field
                )));
            }
        }

        writer.write_record(fields).map_err(encoding_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| PipelineError::Encoding(e.to_string()))
}

fn needs_quoting(field: &str) -> bool {
    field
        .bytes()
        .any(|b| b == FIELD_DELIMITER || b == QUOTE || b == b'\n' || b == b'\r')
}

fn encoding_error(err: csv::Error) -> PipelineError {
    PipelineError::Encoding(err.to_string())
}

/// Byte-stream compressor configured from the pipeline settings
#[derive(Debug, Clone)]
pub struct Compressor {
    codec: Codec,
    level: u32,
    zstd_level: i32,
    zstd_window_log: u32,
}

impl Compressor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            codec: config.codec,
            level: config.compression_level.min(9),
            zstd_level: config.zstd_level,
            zstd_window_log: config.zstd_window_log,
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Compress the full serialized artifact. Any failure is fatal.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let compressed = match self.codec {
            Codec::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(self.level));
                encoder.write_all(data).map_err(PipelineError::Compression)?;
                encoder.finish().map_err(PipelineError::Compression)?
            }
            Codec::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
                encoder.write_all(data).map_err(PipelineError::Compression)?;
                encoder.finish().map_err(PipelineError::Compression)?
            }
            Codec::Zstd => self.compress_zstd(data).map_err(PipelineError::Compression)?,
        };

        debug!("{} compressed {} bytes to {}", self.codec, data.len(), compressed.len());
        Ok(compressed)
    }

    fn compress_zstd(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), self.zstd_level)?;
        encoder.long_distance_matching(true)?;
        encoder.window_log(self.zstd_window_log)?;
        encoder.write_all(data)?;
        encoder.finish()
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(&PipelineConfig::default())
    }
}
