//! Terminal job outcomes and the per-run ledger.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stage at which a document was turned away before polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectStage {
    Upload,
    Submission,
}

/// How a document's processing ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// Results collected.
    Succeeded,
    /// Partial results collected.
    PartialSuccess,
    /// The service reported a failure, or the status could not be queried.
    Failed {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// The service reported a status this crate does not know.
    Unknown { status: String },
    /// Still in progress when the attempt budget or deadline ran out.
    TimedOut { attempts: u32 },
    /// Never reached polling.
    Rejected { stage: RejectStage, message: String },
}

impl JobOutcome {
    /// Whether the document contributes a report row.
    pub fn is_collected(&self) -> bool {
        matches!(self, JobOutcome::Succeeded | JobOutcome::PartialSuccess)
    }
}

/// One document's terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Position in the run's input list.
    pub index: usize,
    /// Local file.
    pub source: PathBuf,
    /// Storage key, when the document got that far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Service job id, when one was assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

/// Outcome totals for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    pub unknown: usize,
    pub timed_out: usize,
    pub rejected: usize,
}

impl OutcomeCounts {
    pub fn collected(&self) -> usize {
        self.succeeded + self.partial
    }

    pub fn dropped(&self) -> usize {
        self.failed + self.unknown + self.timed_out + self.rejected
    }
}

/// Terminal outcome of every document in a run, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeLedger {
    entries: Vec<LedgerEntry>,
}

impl OutcomeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: LedgerEntry) {
        let at = self.entries.partition_point(|e| e.index <= entry.index);
        self.entries.insert(at, entry);
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that produced no report row.
    pub fn dropped(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(|e| !e.outcome.is_collected())
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for entry in &self.entries {
            match entry.outcome {
                JobOutcome::Succeeded => counts.succeeded += 1,
                JobOutcome::PartialSuccess => counts.partial += 1,
                JobOutcome::Failed { .. } => counts.failed += 1,
                JobOutcome::Unknown { .. } => counts.unknown += 1,
                JobOutcome::TimedOut { .. } => counts.timed_out += 1,
                JobOutcome::Rejected { .. } => counts.rejected += 1,
            }
        }
        counts
    }
}
