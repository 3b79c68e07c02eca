//! Filesystem blob store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::StorageError;

use super::{validate_key, BlobStore, StorageKey};

/// Copies documents into a directory tree rooted at `root`.
///
/// Useful when the analysis service reads from a shared mount.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of a stored key.
    pub fn path_of(&self, key: &StorageKey) -> PathBuf {
        key.as_str()
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, local_path: &Path, key: &str) -> Result<StorageKey, StorageError> {
        validate_key(key)?;
        let stored = StorageKey::new(key);
        let destination = self.path_of(&stored);

        fs::metadata(local_path)
            .await
            .map_err(|source| StorageError::Read {
                path: local_path.to_path_buf(),
                source,
            })?;

        debug!("Copying {} to {}", local_path.display(), destination.display());

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Write {
                    key: key.to_string(),
                    source,
                })?;
        }

        fs::copy(local_path, &destination)
            .await
            .map_err(|source| StorageError::Write {
                key: key.to_string(),
                source,
            })?;

        Ok(stored)
    }
}
