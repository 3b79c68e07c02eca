//! HTTP object store (`PUT {base_url}/{key}`).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Url};
use tracing::debug;

use crate::error::StorageError;

use super::{validate_key, BlobStore, StorageKey};

/// Uploads documents to an HTTP object gateway.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    http: HttpClient,
    base_url: Url,
}

impl HttpBlobStore {
    pub fn new(base_url: &str) -> Result<Self, StorageError> {
        Self::with_client(HttpClient::new(), base_url)
    }

    /// Build a store whose requests time out after `timeout`.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, StorageError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        Self::with_client(http, base_url)
    }

    pub fn with_client(http: HttpClient, base_url: &str) -> Result<Self, StorageError> {
        let base_url = Url::parse(base_url).map_err(|e| StorageError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "URL cannot carry a path".to_string(),
            });
        }
        Ok(Self { http, base_url })
    }

    /// Object URL of `key`. Every key segment is percent-encoded on its own.
    fn object_url(&self, key: &str) -> Result<Url, StorageError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| StorageError::InvalidKey(key.to_string()))?
            .pop_if_empty()
            .extend(key.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, local_path: &Path, key: &str) -> Result<StorageKey, StorageError> {
        validate_key(key)?;

        let body = tokio::fs::read(local_path)
            .await
            .map_err(|source| StorageError::Read {
                path: local_path.to_path_buf(),
                source,
            })?;

        let url = self.object_url(key)?;
        debug!("Uploading {} ({} bytes) to {}", local_path.display(), body.len(), url);

        let response = self
            .http
            .put(url)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Rejected {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(StorageKey::new(key))
    }
}
