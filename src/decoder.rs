//! Decoder for the compressed processed artifact
//!
//! Inflates the artifact (codec detected from its magic bytes) and parses the
//! delimited text back into unified records. The provenance tag comes from the
//! `hour` column: rows with a bucket are aggregated counts, rows without are
//! pass-through events.

use crate::config::{Codec, FIELD_DELIMITER, GZIP_MAGIC, PROCESSED_HEADER, QUOTE, ZLIB_MAGIC, ZSTD_MAGIC};
use crate::error::{PipelineError, Result};
use crate::record::{PingsOrType, UnifiedRecord};
use crate::timestamp::TimeBucket;
use flate2::read::{GzDecoder, ZlibDecoder};
use std::io::{self, Read};

/// Identify the compressor from the leading bytes
pub fn detect_codec(data: &[u8]) -> Option<Codec> {
    if data.starts_with(ZSTD_MAGIC) {
        return Some(Codec::Zstd);
    }
    if data.starts_with(GZIP_MAGIC) {
        return Some(Codec::Gzip);
    }
    // zlib: CMF 0x78 and a header checksum divisible by 31
    if data.len() >= 2 && data[0] == ZLIB_MAGIC && (u16::from(data[0]) << 8 | u16::from(data[1])) % 31 == 0 {
        return Some(Codec::Zlib);
    }
    None
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let codec = detect_codec(data).ok_or_else(|| {
        PipelineError::Compression(io::Error::new(
            io::ErrorKind::InvalidData,
            "Unrecognised compressed artifact header",
        ))
    })?;
    decompress_with(codec, data)
}

pub fn decompress_with(codec: Codec, data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let result = match codec {
        Codec::Zlib => ZlibDecoder::new(data).read_to_end(&mut out),
        Codec::Gzip => GzDecoder::new(data).read_to_end(&mut out),
        Codec::Zstd => zstd::stream::read::Decoder::new(data).and_then(|mut d| d.read_to_end(&mut out)),
    };
    result.map_err(PipelineError::Compression)?;
    Ok(out)
}

/// Parse processed text back into unified records
pub fn decode_unified(data: &[u8]) -> Result<Vec<UnifiedRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(FIELD_DELIMITER)
        .quote(QUOTE)
        .has_headers(true)
        .from_reader(data);

    let headers = reader.headers().map_err(|e| PipelineError::malformed(0, e.to_string()))?;
    if headers.iter().ne(PROCESSED_HEADER.iter().copied()) {
        return Err(PipelineError::malformed(
            0,
            format!("expected header {:?}, found {:?}", PROCESSED_HEADER, headers),
        ));
    }

    let mut records = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let number = i as u64 + 1;
        let row = row.map_err(|e| PipelineError::malformed(number, e.to_string()))?;
        records.push(decode_row(number, &row)?);
    }

    Ok(records)
}

fn decode_row(number: u64, row: &csv::StringRecord) -> Result<UnifiedRecord> {
    let field = |i: usize| row.get(i).unwrap_or("");
    let (hour, device_id, pings_or_type, payload) = (field(0), field(1), field(2), field(3));

    if hour.is_empty() {
        return Ok(UnifiedRecord {
            bucket: None,
            device_id: device_id.to_string(),
            total_pings_or_type: PingsOrType::EventType(pings_or_type.to_string()),
            payload_content: payload.to_string(),
        });
    }

    let bucket = TimeBucket::parse(hour)
        .ok_or_else(|| PipelineError::malformed(number, format!("invalid time bucket '{}'", hour)))?;
    let total_pings = pings_or_type
        .parse::<u64>()
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| PipelineError::malformed(number, format!("invalid ping count '{}'", pings_or_type)))?;
    if !payload.is_empty() {
        return Err(PipelineError::malformed(
            number,
            format!("aggregated row carries payload '{}'", payload),
        ));
    }

    Ok(UnifiedRecord {
        bucket: Some(bucket),
        device_id: device_id.to_string(),
        total_pings_or_type: PingsOrType::PingCount(total_pings),
        payload_content: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, QuotePolicy};
    use crate::encoder::{serialize, Compressor};

    #[test]
    fn test_detect_codec() {
        assert_eq!(detect_codec(&[0x78, 0x9c, 0x00]), Some(Codec::Zlib));
        assert_eq!(detect_codec(&[0x1f, 0x8b, 0x08]), Some(Codec::Gzip));
        assert_eq!(detect_codec(&[0x28, 0xb5, 0x2f, 0xfd, 0x00]), Some(Codec::Zstd));
        assert_eq!(detect_codec(&[0x78, 0x00]), None);
        assert_eq!(detect_codec(b"hour,device_id"), None);
        assert_eq!(detect_codec(&[]), None);
    }

    #[test]
    fn test_roundtrip_every_codec() {
        let text = "hour,device_id,total_pings,payload_content\n2023-01-01 00:00,dev_1,3,\n,dev_2,user_action,\"x,y\"\n";
        for codec in [Codec::Zlib, Codec::Gzip, Codec::Zstd] {
            let config = PipelineConfig { codec, ..PipelineConfig::default() };
            let compressed = Compressor::new(&config).compress(text.as_bytes()).unwrap();
            assert_eq!(decompress(&compressed).unwrap(), text.as_bytes());
        }
    }

    #[test]
    fn test_decode_recovers_tags() {
        let text = "hour,device_id,total_pings,payload_content\n\
                    2023-01-01 00:00+02:00,dev_1,3,\n\
                    ,dev_2,42,\"x,y\"\n";
        let records = decode_unified(text.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].total_pings_or_type, PingsOrType::PingCount(3));
        assert_eq!(records[0].bucket.unwrap().to_string(), "2023-01-01 00:00+02:00");
        assert_eq!(records[1].total_pings_or_type, PingsOrType::EventType("42".to_string()));
        assert_eq!(records[1].payload_content, "x,y");

        // And back to the same bytes
        assert_eq!(serialize(&records, QuotePolicy::Necessary).unwrap(), text.as_bytes());
    }

    #[test]
    fn test_decode_header_only() {
        let records = decode_unified(b"hour,device_id,total_pings,payload_content\n").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_rows() {
        let bad_count = "hour,device_id,total_pings,payload_content\n2023-01-01 00:00,dev_1,zero,\n";
        assert!(matches!(
            decode_unified(bad_count.as_bytes()),
            Err(PipelineError::MalformedRecord { record: 1, .. })
        ));

        let stray_payload = "hour,device_id,total_pings,payload_content\n,dev_0,user_action,x\n2023-01-01 00:00,dev_1,4,OK\n";
        assert!(matches!(
            decode_unified(stray_payload.as_bytes()),
            Err(PipelineError::MalformedRecord { record: 2, .. })
        ));

        let bad_header = "timestamp,device_id,event_type,payload\n";
        assert!(matches!(
            decode_unified(bad_header.as_bytes()),
            Err(PipelineError::MalformedRecord { record: 0, .. })
        ));
    }

    #[test]
    fn test_corrupt_artifact_is_compression_error() {
        assert!(matches!(decompress(b"plain text"), Err(PipelineError::Compression(_))));
        assert!(matches!(
            decompress(&[0x78, 0x9c, 0xff, 0xff, 0xff]),
            Err(PipelineError::Compression(_))
        ));
    }
}
