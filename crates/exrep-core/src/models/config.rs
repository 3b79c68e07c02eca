//! Configuration structures for report runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ExrepError;
use crate::report::ReportFormat;

/// Main configuration for exrep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExrepConfig {
    /// Document upload configuration.
    pub storage: StorageConfig,

    /// Analysis service configuration.
    pub analysis: AnalysisConfig,

    /// Job polling limits.
    pub polling: PollingConfig,

    /// Input discovery configuration.
    pub discovery: DiscoveryConfig,

    /// Report output configuration.
    pub output: OutputConfig,
}

/// Where documents are uploaded before analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Copy into a local (or mounted) directory.
    Fs,
    /// `PUT` to an HTTP object gateway.
    Http,
}

/// Document upload configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend.
    pub backend: StorageBackend,

    /// Root directory for the `fs` backend.
    pub root: PathBuf,

    /// Base URL for the `http` backend.
    pub base_url: Option<String>,

    /// Bucket name the analysis service reads from.
    pub bucket: String,

    /// Key prefix placed before the run id.
    pub prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            root: PathBuf::from("staging"),
            base_url: None,
            bucket: "documents".to_string(),
            prefix: String::new(),
        }
    }
}

/// Analysis service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Base URL of the analysis service.
    pub endpoint: Option<String>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_secs: 30,
        }
    }
}

/// Job polling limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Jobs polled concurrently (1 = sequential).
    pub concurrency: usize,

    /// First delay between polls of one job, in milliseconds.
    pub min_delay_ms: u64,

    /// Maximum delay between polls of one job, in milliseconds.
    pub max_delay_ms: u64,

    /// Status queries per job before it times out (0 = unlimited).
    pub max_attempts: usize,

    /// Budget for the whole polling phase in seconds (0 = unlimited).
    pub batch_timeout_secs: u64,

    /// Retries of a status query that failed in transport.
    pub transport_retries: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            min_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 120,
            batch_timeout_secs: 3_600,
            transport_retries: 3,
        }
    }
}

/// Input discovery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// File extensions (without dot) picked up recursively.
    pub extensions: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["png".to_string(), "jpg".to_string(), "pdf".to_string()],
        }
    }
}

/// Report output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving one sub-directory per run.
    pub dir: PathBuf,

    /// Report files written per run.
    pub formats: Vec<ReportFormat>,

    /// Drop columns without any value.
    pub prettify: bool,

    /// Write `outcomes.json` next to the report.
    pub write_ledger: bool,

    /// Skip documents whose upload or submission fails instead of aborting.
    pub continue_on_error: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            formats: vec![ReportFormat::Json, ReportFormat::Csv, ReportFormat::Xlsx],
            prettify: true,
            write_ledger: true,
            continue_on_error: false,
        }
    }
}

impl ExrepConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Check that a run can be started with this configuration.
    pub fn validate(&self) -> Result<(), ExrepError> {
        if self.analysis.endpoint.as_deref().is_none_or(|e| e.trim().is_empty()) {
            return Err(ExrepError::Config(
                "analysis.endpoint is not set".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::Http
            && self.storage.base_url.as_deref().is_none_or(|u| u.trim().is_empty())
        {
            return Err(ExrepError::Config(
                "storage.base_url is required for the http backend".to_string(),
            ));
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(ExrepError::Config("storage.bucket is empty".to_string()));
        }
        if self.discovery.extensions.is_empty() {
            return Err(ExrepError::Config(
                "discovery.extensions is empty".to_string(),
            ));
        }
        if self.output.formats.is_empty() {
            return Err(ExrepError::Config("output.formats is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn runnable() -> ExrepConfig {
        let mut config = ExrepConfig::default();
        config.analysis.endpoint = Some("http://localhost:9000".to_string());
        config
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = runnable();
        config.polling.concurrency = 8;
        config.output.formats = vec![ReportFormat::Csv];
        config.save(&path).unwrap();

        assert_eq!(ExrepConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"polling": {"max_attempts": 5}, "storage": {"backend": "http"}}"#)
            .unwrap();

        let config = ExrepConfig::from_file(&path).unwrap();
        assert_eq!(config.polling.max_attempts, 5);
        assert_eq!(config.polling.concurrency, 4);
        assert_eq!(config.storage.backend, StorageBackend::Http);
        assert_eq!(config.discovery.extensions, vec!["png", "jpg", "pdf"]);
        assert_eq!(
            config.output.formats,
            vec![ReportFormat::Json, ReportFormat::Csv, ReportFormat::Xlsx]
        );
    }

    #[test]
    fn test_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = ExrepConfig::from_file(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_validate() {
        assert!(runnable().validate().is_ok());
        assert!(ExrepConfig::default().validate().is_err());

        let mut config = runnable();
        config.storage.backend = StorageBackend::Http;
        assert!(config.validate().is_err());
        config.storage.base_url = Some("http://store".to_string());
        assert!(config.validate().is_ok());
    }
}
