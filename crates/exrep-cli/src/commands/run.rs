//! Run command - analyse a directory of documents into one report.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use exrep_core::batch::{BatchDriver, BatchOptions, RunReport};
use exrep_core::discovery::discover;
use exrep_core::jobs::{HttpAnalysisService, JobOrchestrator, JobOutcome, PollingPolicy};
use exrep_core::models::config::{ExrepConfig, StorageBackend};
use exrep_core::progress::{ProgressObserver, Stage};
use exrep_core::report::{ReportFormat, ReportWriter};
use exrep_core::storage::{BlobStore, FsBlobStore, HttpBlobStore};

use super::load_config;

/// Report file format.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Json,
    Csv,
    Xlsx,
}

impl From<FormatArg> for ReportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Json => ReportFormat::Json,
            FormatArg::Csv => ReportFormat::Csv,
            FormatArg::Xlsx => ReportFormat::Xlsx,
        }
    }
}

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Directory containing the documents
    input_dir: PathBuf,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// File extensions to include, comma separated
    #[arg(long, value_delimiter = ',')]
    ext: Vec<String>,

    /// Report formats to write (repeatable)
    #[arg(short, long, value_enum)]
    format: Vec<FormatArg>,

    /// Keep columns that have no value in any row
    #[arg(long)]
    no_prettify: bool,

    /// Record failed uploads and submissions instead of aborting
    #[arg(long)]
    continue_on_error: bool,

    /// Number of jobs polled at once
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Analysis service endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Bucket the documents are stored in
    #[arg(long)]
    bucket: Option<String>,
}

impl RunArgs {
    /// Apply command-line overrides on top of the file configuration.
    fn apply(&self, config: &mut ExrepConfig) {
        if let Some(ref dir) = self.output_dir {
            config.output.dir = dir.clone();
        }
        if !self.ext.is_empty() {
            config.discovery.extensions = self.ext.clone();
        }
        if !self.format.is_empty() {
            config.output.formats = self.format.iter().map(|&f| f.into()).collect();
        }
        if self.no_prettify {
            config.output.prettify = false;
        }
        if self.continue_on_error {
            config.output.continue_on_error = true;
        }
        if let Some(concurrency) = self.concurrency {
            config.polling.concurrency = concurrency;
        }
        if let Some(ref endpoint) = self.endpoint {
            config.analysis.endpoint = Some(endpoint.clone());
        }
        if let Some(ref bucket) = self.bucket {
            config.storage.bucket = bucket.clone();
        }
    }
}

/// Progress bars, one per batch stage.
struct BarObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarObserver {
    fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {msg:>7} [{bar:40.cyan/blue}] {pos}/{len}")
            .map(|s| s.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }
}

impl ProgressObserver for BarObserver {
    fn stage_started(&self, stage: Stage, total: usize) {
        let bar = ProgressBar::new(total as u64)
            .with_style(Self::style())
            .with_message(stage.label());
        bar.enable_steady_tick(Duration::from_millis(120));
        if let Ok(mut current) = self.bar.lock() {
            *current = Some(bar);
        }
    }

    fn item_finished(&self, _stage: Stage) {
        if let Ok(current) = self.bar.lock() {
            if let Some(bar) = current.as_ref() {
                bar.inc(1);
            }
        }
    }

    fn stage_finished(&self, _stage: Stage) {
        if let Ok(mut current) = self.bar.lock() {
            if let Some(bar) = current.take() {
                bar.finish();
            }
        }
    }
}

pub async fn run(args: RunArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    args.apply(&mut config);

    let documents = discover(&args.input_dir, &config.discovery.extensions)?;
    if documents.is_empty() {
        anyhow::bail!(
            "No documents with extensions [{}] found in {}",
            config.discovery.extensions.join(", "),
            args.input_dir.display()
        );
    }

    config.validate()?;

    println!(
        "{} Found {} documents to analyse",
        style("ℹ").blue(),
        documents.len()
    );

    let timeout = Duration::from_secs(config.analysis.request_timeout_secs);
    let store: Arc<dyn BlobStore> = match config.storage.backend {
        StorageBackend::Fs => Arc::new(FsBlobStore::new(&config.storage.root)),
        StorageBackend::Http => {
            let base_url = config.storage.base_url.clone().unwrap_or_default();
            Arc::new(HttpBlobStore::with_timeout(&base_url, timeout)?)
        }
    };
    debug!("Using {:?} blob store", config.storage.backend);

    let endpoint = config.analysis.endpoint.clone().unwrap_or_default();
    let service = HttpAnalysisService::with_timeout(endpoint, &config.storage.bucket, timeout)?;
    let orchestrator =
        JobOrchestrator::new(service).with_policy(PollingPolicy::from(&config.polling));

    let writer = ReportWriter::new(&config.output.dir)
        .with_formats(config.output.formats.clone())
        .with_ledger(config.output.write_ledger);

    let driver = BatchDriver::new(store, orchestrator)
        .with_options(BatchOptions::from(&config))
        .with_sink(Box::new(writer))
        .with_observer(Arc::new(BarObserver::new()));

    let report = driver.run(&args.input_dir, documents).await?;

    print_summary(&report, start.elapsed());

    Ok(())
}

fn describe(outcome: &JobOutcome) -> String {
    match outcome {
        JobOutcome::Succeeded => "succeeded".to_string(),
        JobOutcome::PartialSuccess => "partially succeeded".to_string(),
        JobOutcome::Failed { message } => {
            format!("failed: {}", message.as_deref().unwrap_or("no reason given"))
        }
        JobOutcome::Unknown { status } => format!("unknown status {status}"),
        JobOutcome::TimedOut { attempts } => format!("timed out after {attempts} polls"),
        JobOutcome::Rejected { stage, message } => format!("rejected at {stage:?}: {message}"),
    }
}

fn print_summary(report: &RunReport, elapsed: Duration) {
    let counts = report.counts();

    println!();
    println!(
        "{} Run {} produced {} rows in {:?}",
        style("✓").green(),
        report.run_id,
        report.table.len(),
        elapsed
    );
    println!(
        "   {} collected ({} partial), {} failed, {} unknown, {} timed out, {} rejected",
        style(counts.collected()).green(),
        counts.partial,
        style(counts.failed).red(),
        counts.unknown,
        counts.timed_out,
        counts.rejected
    );

    let dropped: Vec<_> = report.ledger.dropped().collect();
    if !dropped.is_empty() {
        println!();
        println!("{}", style("Documents without a row:").red());
        for entry in dropped {
            println!("  - {}: {}", entry.source.display(), describe(&entry.outcome));
        }
    }

    if let Some(ref output) = report.output {
        println!();
        println!(
            "{} Report written to {}",
            style("✓").green(),
            output.display()
        );
    }
}
