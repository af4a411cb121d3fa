//! Pipeline orchestration
//!
//! Summarizer -> Deduplicator -> Serializer/Compressor, each stage consuming
//! the full output of the previous one. Nothing is written to disk until every
//! stage has succeeded for the whole batch.

use crate::config::PipelineConfig;
use crate::dedup::Deduplicator;
use crate::encoder::{serialize, Compressor};
use crate::error::Result;
use crate::raw_log::read_raw_records;
use crate::record::{RawRecord, UnifiedRecord};
use crate::summarizer::Summarizer;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;

/// Record counts and byte sizes gathered during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub raw_records: usize,
    pub high_volume_records: usize,
    pub low_volume_records: usize,
    pub aggregated_records: usize,
    pub records_before_dedup: usize,
    pub records_after_dedup: usize,
    pub serialized_bytes: usize,
    pub compressed_bytes: usize,
    /// Size of the raw input, when it came from a file
    pub input_bytes: Option<u64>,
}

impl PipelineReport {
    /// Space saved relative to the raw input, in percent
    pub fn reduction_ratio(&self) -> Option<f64> {
        match self.input_bytes {
            Some(input) if input > 0 => Some((1.0 - self.compressed_bytes as f64 / input as f64) * 100.0),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Deduplicated records, in output order
    pub records: Vec<UnifiedRecord>,
    /// Delimited text before compression
    pub serialized: Vec<u8>,
    pub compressed: Vec<u8>,
    pub report: PipelineReport,
}

pub struct Pipeline {
    config: PipelineConfig,
    summarizer: Summarizer,
    deduplicator: Deduplicator,
    compressor: Compressor,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            summarizer: Summarizer::new(&config),
            deduplicator: Deduplicator::from_config(&config),
            compressor: Compressor::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, raw: &[RawRecord]) -> Result<PipelineOutput> {
        info!("Layer 1: summarization of {} records", raw.len());
        let summary = self.summarizer.summarize(raw)?;
        let records_before_dedup = summary.records.len();

        info!("Layer 2: deduplication");
        let records = self.deduplicator.dedup(summary.records);

        info!("Layer 3: compression ({})", self.compressor.codec());
        let serialized = serialize(&records, self.config.quote_policy)?;
        let compressed = self.compressor.compress(&serialized)?;

        let report = PipelineReport {
            raw_records: raw.len(),
            high_volume_records: summary.high_volume_count,
            low_volume_records: summary.low_volume_count,
            aggregated_records: summary.aggregated_count,
            records_before_dedup,
            records_after_dedup: records.len(),
            serialized_bytes: serialized.len(),
            compressed_bytes: compressed.len(),
            input_bytes: None,
        };

        Ok(PipelineOutput {
            records,
            serialized,
            compressed,
            report,
        })
    }

    /// Read `input`, run the pipeline, then commit the compressed artifact and,
    /// if requested, the uncompressed processed text. Either both appear or neither does.
    pub fn run_files(&self, input: &Path, processed: Option<&Path>, compressed: &Path) -> Result<PipelineReport> {
        let input_bytes = fs::metadata(input)?.len();
        let raw = read_raw_records(BufReader::new(File::open(input)?))?;

        let output = self.run(&raw)?;

        let mut artifacts: Vec<(&Path, &[u8])> = Vec::with_capacity(2);
        if let Some(path) = processed {
            artifacts.push((path, output.serialized.as_slice()));
        }
        artifacts.push((compressed, output.compressed.as_slice()));
        commit_artifacts(&artifacts)?;

        for (path, data) in &artifacts {
            info!("Wrote {} bytes to {}", data.len(), path.display());
        }

        Ok(PipelineReport {
            input_bytes: Some(input_bytes),
            ..output.report
        })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

/// Write every artifact to a sibling temp file, then rename them all into place.
/// On any failure the temp files and every target renamed by this call are removed,
/// so either all artifacts appear or none do.
fn commit_artifacts(artifacts: &[(&Path, &[u8])]) -> io::Result<()> {
    let temps: Vec<PathBuf> = artifacts.iter().map(|(path, _)| temp_path(path)).collect();

    for ((_, data), tmp) in artifacts.iter().zip(&temps) {
        if let Err(e) = fs::write(tmp, data) {
            remove_all(&temps);
            return Err(e);
        }
    }

    for (i, ((path, _), tmp)) in artifacts.iter().zip(&temps).enumerate() {
        if let Err(e) = fs::rename(tmp, path) {
            remove_all(&temps[i..]);
            let committed: Vec<PathBuf> = artifacts[..i].iter().map(|(p, _)| p.to_path_buf()).collect();
            remove_all(&committed);
            return Err(e);
        }
    }

    Ok(())
}

fn remove_all(paths: &[PathBuf]) {
    for path in paths {
        if path.is_file() {
            fs::remove_file(path).ok();
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{decode_unified, decompress};
    use crate::config::QuotePolicy;
    use crate::error::PipelineError;
    use crate::generator::{generate_records, GeneratorConfig};
    use crate::raw_log::write_raw_records;

    #[test]
    fn test_run_report_counts() {
        let raw = vec![
            RawRecord::new("2023-01-01T00:00:00", "dev_1", "ping", "OK"),
            RawRecord::new("2023-01-01T00:00:01", "dev_1", "ping", "OK"),
            RawRecord::new("2023-01-01T00:00:02", "dev_2", "user_action", "x"),
            RawRecord::new("2023-01-01T09:00:02", "dev_2", "user_action", "x"),
        ];
        let output = Pipeline::default().run(&raw).unwrap();
        let report = &output.report;
        assert_eq!(report.raw_records, 4);
        assert_eq!(report.high_volume_records, 2);
        assert_eq!(report.low_volume_records, 2);
        assert_eq!(report.aggregated_records, 1);
        assert_eq!(report.records_before_dedup, 3);
        assert_eq!(report.records_after_dedup, 2);
        assert_eq!(report.serialized_bytes, output.serialized.len());
        assert_eq!(report.reduction_ratio(), None);

        assert_eq!(decompress(&output.compressed).unwrap(), output.serialized);
        assert_eq!(decode_unified(&output.serialized).unwrap(), output.records);
    }

    #[test]
    fn test_run_files_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("telemetry_raw.csv");
        let processed = dir.path().join("telemetry_processed.csv");
        let compressed = dir.path().join("telemetry_processed.csv.zlib");

        let raw = generate_records(&GeneratorConfig {
            records: 5_000,
            ..GeneratorConfig::default()
        });
        write_raw_records(File::create(&input).unwrap(), &raw).unwrap();

        let report = Pipeline::default()
            .run_files(&input, Some(&processed), &compressed)
            .unwrap();

        assert_eq!(report.raw_records, 5_000);
        assert!(report.records_after_dedup < report.raw_records);
        assert!(report.reduction_ratio().unwrap() > 50.0);

        let processed_bytes = fs::read(&processed).unwrap();
        let compressed_bytes = fs::read(&compressed).unwrap();
        assert_eq!(processed_bytes.len(), report.serialized_bytes);
        assert_eq!(decompress(&compressed_bytes).unwrap(), processed_bytes);
        assert!(!dir.path().join(".telemetry_processed.csv.zlib.tmp").exists());
    }

    fn leftover_temp_files(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.extension().map_or(false, |ext| ext == "tmp"))
            .collect()
    }

    fn write_sample_input(path: &Path) {
        let raw = vec![
            RawRecord::new("2023-01-01T00:00:00", "dev_1", "ping", "OK"),
            RawRecord::new("2023-01-01T00:00:01", "dev_2", "user_action", "a,b"),
        ];
        write_raw_records(File::create(path).unwrap(), &raw).unwrap();
    }

    #[test]
    fn test_failed_commit_removes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.csv");
        let processed = dir.path().join("processed.csv");
        // A directory cannot be replaced by the compressed file
        let compressed = dir.path().join("out.zlib");
        fs::create_dir(&compressed).unwrap();
        write_sample_input(&input);

        let result = Pipeline::default().run_files(&input, Some(&processed), &compressed);

        assert!(matches!(result, Err(PipelineError::Io(_))));
        assert!(!processed.exists());
        assert!(compressed.is_dir());
        assert!(leftover_temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_unquotable_payload_aborts_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.csv");
        let processed = dir.path().join("processed.csv");
        let compressed = dir.path().join("out.zlib");
        write_sample_input(&input);

        let pipeline = Pipeline::new(PipelineConfig {
            quote_policy: QuotePolicy::Never,
            ..PipelineConfig::default()
        });
        let err = pipeline.run_files(&input, Some(&processed), &compressed).unwrap_err();

        assert!(matches!(err, PipelineError::Encoding(_)));
        assert!(!processed.exists());
        assert!(!compressed.exists());
        assert!(leftover_temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_run_files_leaves_nothing_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.csv");
        let compressed = dir.path().join("out.zlib");
        fs::write(&input, "timestamp,device_id,event_type,payload\nbogus,dev_1,ping,OK\n").unwrap();

        let err = Pipeline::default().run_files(&input, None, &compressed).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { record: 1, .. }));
        assert!(!compressed.exists());
    }
}
