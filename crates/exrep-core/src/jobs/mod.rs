//! Asynchronous analysis jobs: service interface, lifecycle types and polling.

mod http;
mod orchestrator;
mod outcome;

pub use http::HttpAnalysisService;
pub use orchestrator::{
    CollectedResult, JobOrchestrator, PollReport, PollingPolicy, SubmissionReport,
};
pub use outcome::{JobOutcome, LedgerEntry, OutcomeCounts, OutcomeLedger, RejectStage};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ServiceError, SubmissionError};
use crate::extraction::RawExtractionResult;
use crate::storage::{DocumentHandle, StorageKey};

/// Status reported by the analysis service for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    InProgress,
    Failed,
    PartialSuccess,
    /// Any status the service may add later.
    Other(String),
}

impl JobStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "SUCCEEDED" => JobStatus::Succeeded,
            "IN_PROGRESS" => JobStatus::InProgress,
            "FAILED" => JobStatus::Failed,
            "PARTIAL_SUCCESS" => JobStatus::PartialSuccess,
            other => JobStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Failed => "FAILED",
            JobStatus::PartialSuccess => "PARTIAL_SUCCESS",
            JobStatus::Other(status) => status,
        }
    }

    /// Whether the status carries extraction results.
    pub fn has_results(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::PartialSuccess)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(JobStatus::parse(&String::deserialize(deserializer)?))
    }
}

/// An in-flight analysis job for one uploaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Identifier assigned by the service.
    pub job_id: String,
    /// Document the job analyses.
    pub document: DocumentHandle,
}

/// Answer to one status query.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPoll {
    pub status: JobStatus,
    /// Free-form explanation from the service, mostly set on failures.
    pub status_message: Option<String>,
    /// Extraction output; present once the job succeeded or partially succeeded.
    pub result: Option<RawExtractionResult>,
}

impl JobPoll {
    pub fn in_progress() -> Self {
        Self::status(JobStatus::InProgress)
    }

    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            status_message: None,
            result: None,
        }
    }

    pub fn succeeded(result: RawExtractionResult) -> Self {
        Self {
            status: JobStatus::Succeeded,
            status_message: None,
            result: Some(result),
        }
    }

    pub fn partial(result: RawExtractionResult) -> Self {
        Self {
            status: JobStatus::PartialSuccess,
            status_message: None,
            result: Some(result),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            status_message: Some(message.into()),
            result: None,
        }
    }
}

/// Remote document-understanding service running expense analyses.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Start an analysis of the stored document and return the job id.
    async fn start(&self, key: &StorageKey) -> Result<String, SubmissionError>;

    /// Query the current state of a job.
    async fn poll(&self, job_id: &str) -> Result<JobPoll, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!(JobStatus::parse("SUCCEEDED"), JobStatus::Succeeded);
        assert_eq!(JobStatus::parse("IN_PROGRESS"), JobStatus::InProgress);
        assert_eq!(JobStatus::parse("FAILED"), JobStatus::Failed);
        assert_eq!(JobStatus::parse("PARTIAL_SUCCESS"), JobStatus::PartialSuccess);
        assert_eq!(
            JobStatus::parse("QUEUED"),
            JobStatus::Other("QUEUED".to_string())
        );
        assert_eq!(JobStatus::parse("QUEUED").as_str(), "QUEUED");
    }

    #[test]
    fn test_status_has_results() {
        assert!(JobStatus::Succeeded.has_results());
        assert!(JobStatus::PartialSuccess.has_results());
        assert!(!JobStatus::Failed.has_results());
        assert!(!JobStatus::InProgress.has_results());
    }
}
