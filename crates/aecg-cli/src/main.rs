use aecg_lib::{
    batch::index_batch,
    config::{DerivationConfig, IndexConfig},
    intervals::derive_waveform_intervals,
    io::{read_annotation_csv, read_document},
    units::parse_hl7_datetime,
    WaveformDescriptor,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

#[derive(Parser)]
#[command(
    name = "aecg",
    version,
    about = "Derive ECG intervals from HL7 aECG annotations"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive RR/PR/QRS/QT/QTcF from one waveform's annotation table (CSV)
    Intervals {
        #[arg(long)]
        annotations: PathBuf,
        /// HL7 timestamp of the waveform's first sample
        #[arg(long)]
        start_time: String,
        /// Also print every individual interval
        #[arg(long)]
        keep_raw: bool,
        #[arg(long)]
        ron_retrigger_ms: Option<f64>,
    },
    /// Build study index rows for extracted aECG documents (JSON lines)
    Index {
        #[arg(required = true)]
        documents: Vec<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        keep_raw: bool,
        /// Stop starting new files after the first unreadable one
        #[arg(long)]
        fail_fast: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Intervals {
            annotations,
            start_time,
            keep_raw,
            ron_retrigger_ms,
        } => cmd_intervals(&annotations, &start_time, keep_raw, ron_retrigger_ms)?,
        Commands::Index {
            documents,
            config,
            workers,
            keep_raw,
            fail_fast,
        } => cmd_index(&documents, config.as_deref(), workers, keep_raw, fail_fast)?,
    }
    Ok(())
}

fn cmd_intervals(
    annotations: &Path,
    start_time: &str,
    keep_raw: bool,
    ron_retrigger_ms: Option<f64>,
) -> Result<()> {
    parse_hl7_datetime(start_time).context("invalid --start-time")?;
    let records = read_annotation_csv(annotations)?;
    let mut cfg = DerivationConfig::default();
    if let Some(ms) = ron_retrigger_ms {
        cfg.ron_retrigger_ms = ms;
    }
    let waveform = WaveformDescriptor::new(start_time);
    let result = derive_waveform_intervals(&waveform, &records, &cfg, keep_raw);
    info!(
        "{}: {} boundaries projected, {} summary rows",
        annotations.display(),
        result.projected,
        result.summary.len()
    );
    let js = serde_json::to_string(&result)?;
    println!("{}", js);
    Ok(())
}

fn cmd_index(
    documents: &[PathBuf],
    config: Option<&Path>,
    workers: Option<usize>,
    keep_raw: bool,
    fail_fast: bool,
) -> Result<()> {
    let mut cfg = match config {
        Some(path) => IndexConfig::load(path)?,
        None => IndexConfig::default(),
    };
    if let Some(workers) = workers {
        cfg.workers = workers;
    }
    cfg.keep_raw_intervals |= keep_raw;
    cfg.fail_fast |= fail_fast;

    let cancel = AtomicBool::new(false);
    let report = index_batch(documents, &cfg, &cancel, read_document);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in report.records() {
        writeln!(out, "{}", serde_json::to_string(record)?)?;
    }
    info!(
        "indexed {} of {} files",
        documents.len() - report.skipped(),
        documents.len()
    );
    Ok(())
}
