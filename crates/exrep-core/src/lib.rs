//! Core library for batch expense document analysis.
//!
//! This crate provides:
//! - Input discovery and upload to a blob store
//! - Asynchronous analysis job submission and polling
//! - Normalization of detected fields into a fixed invoice/receipt catalog
//! - Report compilation and persistence (JSON, CSV, outcome ledger)

pub mod batch;
pub mod catalog;
pub mod discovery;
pub mod error;
pub mod extraction;
pub mod jobs;
pub mod models;
pub mod progress;
pub mod report;
pub mod storage;

pub use batch::{BatchDriver, BatchOptions, RunReport};
pub use catalog::{canonical_fields, CanonicalField};
pub use discovery::discover;
pub use error::{ExrepError, Result};
pub use extraction::{normalize, NormalizedRecord, RawExtractionResult};
pub use jobs::{AnalysisService, HttpAnalysisService, JobOrchestrator, JobOutcome, OutcomeLedger, PollingPolicy};
pub use models::config::ExrepConfig;
pub use progress::{ProgressObserver, Stage};
pub use report::{compile, ReportFormat, ReportTable, ReportWriter};
pub use storage::{BlobStore, FsBlobStore, HttpBlobStore};
