//! Error types for the exrep-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the exrep library.
#[derive(Error, Debug)]
pub enum ExrepError {
    /// Input discovery error.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Document upload error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Analysis job submission error.
    #[error("submission error: {0}")]
    Submission(#[from] SubmissionError),

    /// Report persistence error.
    #[error("report error: {0}")]
    Report(#[from] ReportError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while enumerating input documents.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The root does not exist or is not a directory.
    #[error("{0} is not a valid directory")]
    NotADirectory(PathBuf),

    /// The root path cannot be turned into a search pattern.
    #[error("invalid search path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },
}

/// Errors raised by blob store collaborators.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The local document could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document could not be written to the store.
    #[error("failed to write {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The storage key is not usable (empty, absolute, or escaping the store).
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    /// The remote store address is not a usable URL.
    #[error("invalid store URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The remote store refused the upload.
    #[error("upload of {key} rejected with status {status}")]
    Rejected { key: String, status: u16 },

    /// Transport-level failure talking to the remote store.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors raised when the analysis service refuses to start a job.
#[derive(Error, Debug)]
pub enum SubmissionError {
    /// The service rejected the request (malformed input, throttling, ...).
    #[error("analysis of {key} rejected with status {status}: {message}")]
    Rejected {
        key: String,
        status: u16,
        message: String,
    },

    /// The request never reached the service.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with an unreadable body.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors raised while querying the status of a running job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The request never reached the service.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered with an unreadable body.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Whether a repeated request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Transport(_) => true,
            ServiceError::Status { status, .. } => *status == 429 || *status >= 500,
            ServiceError::InvalidResponse(_) => false,
        }
    }
}

/// Errors raised while persisting a report.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Filesystem failure.
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV serialization failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Spreadsheet serialization failure.
    #[error("spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// JSON serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for the exrep library.
pub type Result<T> = std::result::Result<T, ExrepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_service_errors() {
        assert!(ServiceError::Transport("reset".into()).is_transient());
        assert!(ServiceError::Status { status: 503, body: String::new() }.is_transient());
        assert!(ServiceError::Status { status: 429, body: String::new() }.is_transient());
        assert!(!ServiceError::Status { status: 404, body: String::new() }.is_transient());
        assert!(!ServiceError::InvalidResponse("eof".into()).is_transient());
    }

    #[test]
    fn test_discovery_error_message() {
        let err = DiscoveryError::NotADirectory(PathBuf::from("demo_data"));
        assert_eq!(err.to_string(), "demo_data is not a valid directory");
    }
}
