//! Reading and writing the raw event log
//!
//! `timestamp,device_id,event_type,payload`, one record per line. Columns are
//! matched by header name, so their order in the file does not matter.

use crate::config::{FIELD_DELIMITER, RAW_HEADER, RECORD_TERMINATOR};
use crate::error::{PipelineError, Result};
use crate::record::RawRecord;
use std::io::{Read, Write};

pub fn read_raw_records<R: Read>(reader: R) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(FIELD_DELIMITER)
        .has_headers(true)
        .from_reader(reader);

    let headers = reader.headers().map_err(read_error)?.clone();
    for column in RAW_HEADER {
        if !headers.iter().any(|h| h == column) {
            return Err(PipelineError::malformed(0, format!("missing column '{}'", column)));
        }
    }

    let mut records = Vec::new();
    for row in reader.deserialize::<RawRecord>() {
        records.push(row.map_err(read_error)?);
    }

    Ok(records)
}

pub fn write_raw_records<W: Write>(writer: W, records: &[RawRecord]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(FIELD_DELIMITER)
        .terminator(csv::Terminator::Any(RECORD_TERMINATOR))
        .has_headers(true)
        .from_writer(writer);

    for record in records {
        writer.serialize(record).map_err(write_error)?;
    }
    if records.is_empty() {
        writer.write_record(RAW_HEADER).map_err(write_error)?;
    }
    writer.flush()?;

    Ok(())
}

fn read_error(err: csv::Error) -> PipelineError {
    // Position::record counts the header as record 0, which matches our numbering
    let record = err.position().map(|p| p.record()).unwrap_or(0);
    match err.into_kind() {
        csv::ErrorKind::Io(io) => PipelineError::Io(io),
        kind => PipelineError::malformed(record, describe(kind)),
    }
}

fn describe(kind: csv::ErrorKind) -> String {
    match kind {
        csv::ErrorKind::Utf8 { err, .. } => format!("invalid UTF-8: {}", err),
        csv::ErrorKind::UnequalLengths { expected_len, len, .. } => {
            format!("expected {} fields, found {}", expected_len, len)
        }
        csv::ErrorKind::Deserialize { err, .. } => err.to_string(),
        other => format!("{:?}", other),
    }
}

fn write_error(err: csv::Error) -> PipelineError {
    match err.into_kind() {
        csv::ErrorKind::Io(io) => PipelineError::Io(io),
        kind => PipelineError::Encoding(format!("{:?}", kind)),
    }
}
