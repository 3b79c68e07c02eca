//! One end-to-end run: upload, analyse, normalize, compile and persist.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::extraction::normalize;
use crate::jobs::{
    AnalysisService, JobOrchestrator, JobOutcome, LedgerEntry, OutcomeCounts, OutcomeLedger,
    RejectStage,
};
use crate::models::config::ExrepConfig;
use crate::progress::{NoProgress, ProgressObserver, Stage};
use crate::report::{ReportBuilder, ReportSink, ReportTable, RunSummary};
use crate::storage::{object_key, BlobStore, DocumentHandle};

/// Behaviour switches of a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Leading segment of every storage key.
    pub prefix: String,
    /// Drop columns without any value before persisting.
    pub prettify: bool,
    /// Record upload and submission failures instead of aborting the run.
    pub continue_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            prettify: true,
            continue_on_error: false,
        }
    }
}

impl From<&ExrepConfig> for BatchOptions {
    fn from(config: &ExrepConfig) -> Self {
        Self {
            prefix: config.storage.prefix.clone(),
            prettify: config.output.prettify,
            continue_on_error: config.output.continue_on_error,
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub table: ReportTable,
    pub ledger: OutcomeLedger,
    /// Directory the sink wrote to, if a sink was configured.
    pub output: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn counts(&self) -> OutcomeCounts {
        self.ledger.counts()
    }
}

/// Coordinates the collaborators of a batch run.
pub struct BatchDriver<S> {
    store: Arc<dyn BlobStore>,
    orchestrator: JobOrchestrator<S>,
    sink: Option<Box<dyn ReportSink>>,
    options: BatchOptions,
    observer: Arc<dyn ProgressObserver>,
}

impl<S: AnalysisService> BatchDriver<S> {
    pub fn new(store: Arc<dyn BlobStore>, orchestrator: JobOrchestrator<S>) -> Self {
        Self {
            store,
            orchestrator,
            sink: None,
            options: BatchOptions::default(),
            observer: Arc::new(NoProgress),
        }
    }

    /// Persist finished runs through `sink`.
    pub fn with_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Report progress of every stage, polling included, to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.orchestrator = self.orchestrator.with_observer(observer.clone());
        self.observer = observer;
        self
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Process `documents` found under `root` as a new run.
    pub async fn run(&self, root: &Path, documents: Vec<PathBuf>) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        self.run_with_id(&run_id, root, documents).await
    }

    /// Process `documents` found under `root` under a caller-chosen run id.
    pub async fn run_with_id(
        &self,
        run_id: &str,
        root: &Path,
        documents: Vec<PathBuf>,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        info!("Starting run {} with {} documents", run_id, documents.len());

        let mut ledger = OutcomeLedger::new();

        let uploaded = self.upload(run_id, root, documents, &mut ledger).await?;

        let submission = self.orchestrator.submit_all(uploaded).await;
        let mut refused = submission.rejected.into_iter();
        if !self.options.continue_on_error {
            if let Some((_, err)) = refused.next() {
                return Err(err.into());
            }
        }
        for (document, err) in refused {
            let key = Some(document.key.to_string());
            ledger.record(rejected(
                document.ordinal,
                document.source,
                key,
                RejectStage::Submission,
                err.to_string(),
            ));
        }

        let polled = self.orchestrator.poll_all(submission.jobs).await;
        for (job, outcome) in polled.outcomes {
            ledger.record(LedgerEntry {
                index: job.document.ordinal,
                source: job.document.source,
                key: Some(job.document.key.to_string()),
                job_id: Some(job.job_id),
                outcome,
            });
        }

        let mut builder = ReportBuilder::new();
        for collected in &polled.collected {
            let record = normalize(&collected.result);
            builder.push_sourced(collected.job.document.key.as_str(), &record);
        }
        let mut table = builder.build();
        if self.options.prettify {
            table = table.prettify();
        }

        let counts = ledger.counts();
        if counts.dropped() > 0 {
            warn!(
                "{} of {} documents produced no row",
                counts.dropped(),
                ledger.len()
            );
        }

        let finished_at = Utc::now();
        let output = match &self.sink {
            Some(sink) => {
                let summary = RunSummary {
                    run_id,
                    started_at,
                    finished_at,
                    rows: table.len(),
                    counts,
                    ledger: &ledger,
                };
                Some(sink.persist(&summary, &table)?)
            }
            None => None,
        };

        info!("Run {} finished with {} rows", run_id, table.len());

        Ok(RunReport {
            run_id: run_id.to_string(),
            table,
            ledger,
            output,
            started_at,
            finished_at,
        })
    }

    async fn upload(
        &self,
        run_id: &str,
        root: &Path,
        documents: Vec<PathBuf>,
        ledger: &mut OutcomeLedger,
    ) -> Result<Vec<DocumentHandle>> {
        info!("Uploading {} documents", documents.len());
        self.observer.stage_started(Stage::Upload, documents.len());

        let mut uploaded = Vec::with_capacity(documents.len());
        for (ordinal, source) in documents.into_iter().enumerate() {
            let key = object_key(&self.options.prefix, run_id, root, &source);
            let result = self.store.put(&source, &key).await;
            self.observer.item_finished(Stage::Upload);

            match result {
                Ok(key) => uploaded.push(DocumentHandle {
                    ordinal,
                    source,
                    key,
                }),
                Err(err) if self.options.continue_on_error => {
                    warn!("Upload of {} failed: {}", source.display(), err);
                    let entry = rejected(
                        ordinal,
                        source,
                        Some(key),
                        RejectStage::Upload,
                        err.to_string(),
                    );
                    ledger.record(entry);
                }
                Err(err) => {
                    self.observer.stage_finished(Stage::Upload);
                    return Err(err.into());
                }
            }
        }

        self.observer.stage_finished(Stage::Upload);
        Ok(uploaded)
    }
}

fn rejected(
    index: usize,
    source: PathBuf,
    key: Option<String>,
    stage: RejectStage,
    message: String,
) -> LedgerEntry {
    LedgerEntry {
        index,
        source,
        key,
        job_id: None,
        outcome: JobOutcome::Rejected { stage, message },
    }
}
