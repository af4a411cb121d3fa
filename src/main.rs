//! DSOP command-line driver
//!
//! Generates synthetic telemetry, runs the three-layer pipeline over a raw
//! event log and inflates processed artifacts back to text.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dsop::config::{Codec, DedupField, Granularity, PipelineConfig, QuotePolicy};
use dsop::generator::{generate_records, GeneratorConfig};
use dsop::raw_log::write_raw_records;
use dsop::{decoder, Pipeline, PipelineReport};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Parser)]
#[command(name = "dsop", author, version, about = "Data Stream Optimization Pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a synthetic raw event log
    Generate(GenerateArgs),
    /// Summarize, deduplicate and compress a raw event log
    Run(RunArgs),
    /// Inflate a compressed artifact back to processed text
    Decompress(DecompressArgs),
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long, default_value = "telemetry_raw.csv")]
    output: PathBuf,

    #[arg(long, default_value_t = 100_000)]
    records: usize,

    #[arg(long, default_value_t = 100)]
    devices: u32,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, default_value = "telemetry_raw.csv")]
    input: PathBuf,

    /// Compressed artifact path
    #[arg(long, default_value = "telemetry_processed.csv.zlib")]
    compressed: PathBuf,

    /// Also keep the uncompressed processed text
    #[arg(long)]
    processed: Option<PathBuf>,

    /// Event types aggregated as high-volume
    #[arg(long, env = "DSOP_HIGH_VOLUME", value_delimiter = ',', default_value = "ping")]
    high_volume: Vec<String>,

    #[arg(long, env = "DSOP_GRANULARITY", default_value = "hour")]
    granularity: Granularity,

    #[arg(
        long,
        env = "DSOP_DEDUP_KEY",
        value_delimiter = ',',
        default_value = "device_id,total_pings,payload_content"
    )]
    dedup_key: Vec<DedupField>,

    #[arg(long, env = "DSOP_CODEC", default_value = "zlib")]
    codec: Codec,

    /// Deflate level (zlib/gzip)
    #[arg(long, default_value_t = 6)]
    level: u32,

    /// zstd level
    #[arg(long, default_value_t = 3)]
    zstd_level: i32,

    /// Fail instead of quoting fields that contain delimiters
    #[arg(long)]
    no_quoting: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            high_volume_event_types: self.high_volume.iter().map(|s| s.trim().to_string()).collect(),
            granularity: self.granularity,
            dedup_key: self.dedup_key.clone(),
            codec: self.codec,
            compression_level: self.level,
            zstd_level: self.zstd_level,
            quote_policy: if self.no_quoting { QuotePolicy::Never } else { QuotePolicy::Necessary },
            ..PipelineConfig::default()
        }
    }
}

#[derive(Debug, Args)]
struct DecompressArgs {
    #[arg(long)]
    input: PathBuf,

    /// Defaults to stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Generate(args) => generate(args),
        Command::Run(args) => run(args),
        Command::Decompress(args) => decompress(args),
    }
}

fn generate(args: GenerateArgs) -> Result<()> {
    let config = GeneratorConfig {
        records: args.records,
        devices: args.devices,
        seed: args.seed,
        ..GeneratorConfig::default()
    };
    let records = generate_records(&config);

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    write_raw_records(BufWriter::new(file), &records)?;

    info!("Generated {} records into {}", records.len(), args.output.display());
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    let pipeline = Pipeline::new(args.pipeline_config());
    info!("Configuration: {:?}", pipeline.config());

    let start = Instant::now();
    let report = pipeline
        .run_files(&args.input, args.processed.as_deref(), &args.compressed)
        .with_context(|| format!("Pipeline failed for {}", args.input.display()))?;
    info!("Pipeline finished in {:.2}s", start.elapsed().as_secs_f64());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &PipelineReport) {
    let input_mb = report.input_bytes.unwrap_or(0) as f64 / BYTES_PER_MB;
    let compressed_mb = report.compressed_bytes as f64 / BYTES_PER_MB;

    println!("--- DSOP Pipeline Execution ---");
    println!("Initial raw data size: {:.2} MB", input_mb);
    println!("Initial record count: {}", report.raw_records);
    println!();
    println!("Layer 1: Summarization");
    println!("Original high-volume records: {}", report.high_volume_records);
    println!("Aggregated records: {}", report.aggregated_records);
    println!("Low-volume records: {}", report.low_volume_records);
    println!();
    println!("Layer 2: Deduplication");
    println!("Records before deduplication: {}", report.records_before_dedup);
    println!("Records after deduplication: {}", report.records_after_dedup);
    println!();
    println!("Layer 3: Compression");
    println!("Serialized size: {} bytes", report.serialized_bytes);
    println!("Compressed size: {} bytes", report.compressed_bytes);
    println!();
    println!("--- Final Results ---");
    println!("Final processed record count: {}", report.records_after_dedup);
    println!("Final compressed size: {:.2} MB", compressed_mb);
    if let Some(ratio) = report.reduction_ratio() {
        println!("Overall space reduction ratio: {:.2}%", ratio);
    }
}

fn decompress(args: DecompressArgs) -> Result<()> {
    let data = fs::read(&args.input).with_context(|| format!("Failed to read {}", args.input.display()))?;
    let text = decoder::decompress(&data)?;
    // Validate before handing the text on
    let records = decoder::decode_unified(&text)?;

    match &args.output {
        Some(path) => fs::write(path, &text).with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&text)?;
            stdout.flush()?;
        }
    }

    info!("Decompressed {} records ({} bytes)", records.len(), text.len());
    Ok(())
}
