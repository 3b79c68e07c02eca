//! Blob store collaborators receiving documents before analysis.

mod fs;
mod http;

pub use fs::FsBlobStore;
pub use http::HttpBlobStore;

use std::fmt;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Location of an uploaded document inside the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document that has been uploaded and awaits submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    /// Position of the document in the run's input list.
    pub ordinal: usize,
    /// Local file the document was read from.
    pub source: PathBuf,
    /// Where the store put it.
    pub key: StorageKey,
}

/// Trait abstracting over blob storage backends.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `local_path` under `key` and return the stored location.
    async fn put(&self, local_path: &Path, key: &str) -> Result<StorageKey, StorageError>;
}

/// Build the storage key for `path`: `{prefix}/{run_id}/{path relative to root}`.
///
/// Keys always use `/` separators. Paths outside `root` fall back to the file name.
pub fn object_key(prefix: &str, run_id: &str, root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() || relative.is_absolute() {
        parts = path
            .file_name()
            .map(|name| vec![name.to_string_lossy().into_owned()])
            .unwrap_or_default();
    }

    let prefix = prefix.trim_matches('/');
    let mut key = String::new();
    if !prefix.is_empty() {
        key.push_str(prefix);
        key.push('/');
    }
    key.push_str(run_id);
    for part in parts {
        key.push('/');
        key.push_str(&part);
    }
    key
}

/// Reject keys that would escape the store root.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
