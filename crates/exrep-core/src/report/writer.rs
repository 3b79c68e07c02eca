//! Writing compiled reports to disk.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_xlsxwriter::Workbook;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ReportError;
use crate::jobs::{OutcomeCounts, OutcomeLedger};

use super::ReportTable;

/// Serialized report forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// `report.json`: array of row objects, `null` for absent values.
    Json,
    /// `report.csv`: header row of column names, empty cells for absent values.
    Csv,
    /// `report.xlsx`: one worksheet, header row of column names, empty cells for absent values.
    Xlsx,
}

impl ReportFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            ReportFormat::Json => "report.json",
            ReportFormat::Csv => "report.csv",
            ReportFormat::Xlsx => "report.xlsx",
        }
    }
}

/// Run metadata persisted with the outcome ledger.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    pub run_id: &'a str,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows: usize,
    pub counts: OutcomeCounts,
    pub ledger: &'a OutcomeLedger,
}

/// Destination of a finished run.
pub trait ReportSink: Send + Sync {
    /// Persist the table and ledger of a run, returning where they went.
    fn persist(&self, summary: &RunSummary<'_>, table: &ReportTable) -> Result<PathBuf, ReportError>;
}

/// Writes reports under `{output_dir}/{run_id}/`.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
    formats: Vec<ReportFormat>,
    write_ledger: bool,
}

impl ReportWriter {
    /// Create a writer producing JSON, CSV and spreadsheet reports plus the ledger.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            formats: vec![ReportFormat::Json, ReportFormat::Csv, ReportFormat::Xlsx],
            write_ledger: true,
        }
    }

    /// Set the report formats.
    pub fn with_formats(mut self, formats: Vec<ReportFormat>) -> Self {
        self.formats = formats;
        self
    }

    /// Set whether `outcomes.json` is written.
    pub fn with_ledger(mut self, write_ledger: bool) -> Self {
        self.write_ledger = write_ledger;
        self
    }

    /// Directory receiving the files of `run_id`.
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.output_dir.join(run_id)
    }

    fn create(path: &Path) -> Result<BufWriter<File>, ReportError> {
        File::create(path)
            .map(BufWriter::new)
            .map_err(|source| io_error(path, source))
    }

    fn write_json(path: &Path, table: &ReportTable) -> Result<(), ReportError> {
        let mut out = Self::create(path)?;
        let records: Vec<_> = table.records().collect();
        serde_json::to_writer_pretty(&mut out, &records)?;
        out.flush().map_err(|source| io_error(path, source))
    }

    fn write_csv(path: &Path, table: &ReportTable) -> Result<(), ReportError> {
        let mut wtr = csv::Writer::from_writer(Self::create(path)?);
        if table.columns().is_empty() {
            return wtr.flush().map_err(|source| io_error(path, source));
        }

        wtr.write_record(table.column_names())?;
        for row in table.rows() {
            wtr.write_record(row.cells().iter().map(|cell| cell.as_deref().unwrap_or("")))?;
        }

        wtr.flush().map_err(|source| io_error(path, source))
    }

    fn write_xlsx(path: &Path, table: &ReportTable) -> Result<(), ReportError> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();

        for (col, name) in (0u16..).zip(table.column_names()) {
            sheet.write_string(0, col, name)?;
        }
        for (row, cells) in (1u32..).zip(table.rows().iter().map(|r| r.cells())) {
            for (col, cell) in (0u16..).zip(cells) {
                if let Some(value) = cell {
                    sheet.write_string(row, col, value)?;
                }
            }
        }

        workbook.save(path)?;
        Ok(())
    }

    fn write_ledger(path: &Path, summary: &RunSummary<'_>) -> Result<(), ReportError> {
        let mut out = Self::create(path)?;
        serde_json::to_writer_pretty(&mut out, summary)?;
        out.flush().map_err(|source| io_error(path, source))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ReportError {
    ReportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl ReportSink for ReportWriter {
    fn persist(&self, summary: &RunSummary<'_>, table: &ReportTable) -> Result<PathBuf, ReportError> {
        let dir = self.run_dir(summary.run_id);
        if !dir.exists() {
            debug!("Creating directory {}", dir.display());
            fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
        }

        info!("Saving reports to {}", dir.display());

        for format in &self.formats {
            let path = dir.join(format.file_name());
            debug!("Saving {}", path.display());
            match format {
                ReportFormat::Json => Self::write_json(&path, table)?,
                ReportFormat::Csv => Self::write_csv(&path, table)?,
                ReportFormat::Xlsx => Self::write_xlsx(&path, table)?,
            }
        }

        if self.write_ledger {
            Self::write_ledger(&dir.join("outcomes.json"), summary)?;
        }

        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CanonicalField;
    use crate::extraction::NormalizedRecord;
    use crate::jobs::{JobOutcome, LedgerEntry};
    use crate::report::compile;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn table() -> ReportTable {
        let first: NormalizedRecord = [(CanonicalField::Total, "12.50".to_string())].into();
        let second: NormalizedRecord = [
            (CanonicalField::Total, "7.00".to_string()),
            (CanonicalField::VendorName, "Acme, Inc.".to_string()),
        ]
        .into();
        compile(vec![first, second]).prettify()
    }

    fn ledger() -> OutcomeLedger {
        let mut ledger = OutcomeLedger::new();
        ledger.record(LedgerEntry {
            index: 0,
            source: PathBuf::from("in/a.png"),
            key: Some("run/a.png".into()),
            job_id: Some("j-a".into()),
            outcome: JobOutcome::Succeeded,
        });
        ledger
    }

    fn summary(ledger: &OutcomeLedger) -> RunSummary<'_> {
        RunSummary {
            run_id: "run-1",
            started_at: Utc::now(),
            finished_at: Utc::now(),
            rows: 2,
            counts: ledger.counts(),
            ledger,
        }
    }

    #[test]
    fn test_writes_all_formats() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path());
        let ledger = ledger();

        let run_dir = writer.persist(&summary(&ledger), &table()).unwrap();

        assert_eq!(run_dir, dir.path().join("run-1"));

        let csv = std::fs::read_to_string(run_dir.join("report.csv")).unwrap();
        assert_eq!(csv, "VENDOR_NAME,TOTAL\n,12.50\n\"Acme, Inc.\",7.00\n");

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(run_dir.join("report.json")).unwrap())
                .unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"VENDOR_NAME": null, "TOTAL": "12.50"},
                {"VENDOR_NAME": "Acme, Inc.", "TOTAL": "7.00"}
            ])
        );

        let outcomes: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(run_dir.join("outcomes.json")).unwrap())
                .unwrap();
        assert_eq!(outcomes["run_id"], "run-1");
        assert_eq!(outcomes["counts"]["succeeded"], 1);
        assert_eq!(outcomes["ledger"]["entries"][0]["outcome"], "succeeded");

        let xlsx = std::fs::read(run_dir.join("report.xlsx")).unwrap();
        assert!(xlsx.starts_with(b"PK"));
    }

    #[test]
    fn test_spreadsheet_only() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path()).with_formats(vec![ReportFormat::Xlsx]);
        let ledger = ledger();

        let run_dir = writer.persist(&summary(&ledger), &table()).unwrap();

        let metadata = std::fs::metadata(run_dir.join("report.xlsx")).unwrap();
        assert!(metadata.len() > 0);
        assert!(!run_dir.join("report.csv").exists());
        assert!(!run_dir.join("report.json").exists());
    }

    #[test]
    fn test_format_names() {
        let formats: Vec<ReportFormat> = serde_json::from_str(r#"["json","csv","xlsx"]"#).unwrap();
        assert_eq!(
            formats,
            vec![ReportFormat::Json, ReportFormat::Csv, ReportFormat::Xlsx]
        );
        assert_eq!(ReportFormat::Xlsx.file_name(), "report.xlsx");
    }

    #[test]
    fn test_selected_formats_only() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::new(dir.path())
            .with_formats(vec![ReportFormat::Csv])
            .with_ledger(false);
        let ledger = ledger();

        let run_dir = writer.persist(&summary(&ledger), &table()).unwrap();

        assert!(run_dir.join("report.csv").exists());
        assert!(!run_dir.join("report.json").exists());
        assert!(!run_dir.join("outcomes.json").exists());
    }
}
