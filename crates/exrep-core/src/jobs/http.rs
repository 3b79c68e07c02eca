//! JSON-over-HTTP client for an expense analysis service.
//!
//! Routes:
//! - `POST {endpoint}/jobs` with `{"DocumentLocation": {"S3Object": {"Bucket", "Name"}}}`,
//!   answered by `{"JobId": ...}`.
//! - `GET {endpoint}/jobs/{id}[?NextToken=...]`, answered by
//!   `{"JobStatus", "StatusMessage", "ExpenseDocuments", "NextToken"}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ServiceError, SubmissionError};
use crate::extraction::{ExpenseDocument, RawExtractionResult};
use crate::storage::StorageKey;

use super::{AnalysisService, JobPoll, JobStatus};

/// Upper bound on result pages fetched for one job.
const MAX_RESULT_PAGES: usize = 1_000;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartRequest<'a> {
    document_location: DocumentLocation<'a>,
}

#[derive(Serialize)]
struct DocumentLocation<'a> {
    #[serde(rename = "S3Object")]
    object: ObjectLocation<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectLocation<'a> {
    bucket: &'a str,
    name: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartResponse {
    job_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusPage {
    job_status: JobStatus,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    expense_documents: Vec<ExpenseDocument>,
    #[serde(default)]
    next_token: Option<String>,
}

/// HTTP analysis service client.
#[derive(Debug, Clone)]
pub struct HttpAnalysisService {
    http: HttpClient,
    endpoint: String,
    bucket: String,
}

impl HttpAnalysisService {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self::with_client(HttpClient::new(), endpoint, bucket)
    }

    /// Build a client whose requests time out after `timeout`.
    pub fn with_timeout(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, endpoint, bucket))
    }

    pub fn with_client(
        http: HttpClient,
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
        }
    }

    async fn fetch_page(
        &self,
        job_id: &str,
        next_token: Option<&str>,
    ) -> Result<StatusPage, ServiceError> {
        let mut request = self.http.get(format!("{}/jobs/{}", self.endpoint, job_id));
        if let Some(token) = next_token {
            request = request.query(&[("NextToken", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let response = ensure_success(response).await?;

        response
            .json::<StatusPage>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

async fn ensure_success(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn start(&self, key: &StorageKey) -> Result<String, SubmissionError> {
        let body = StartRequest {
            document_location: DocumentLocation {
                object: ObjectLocation {
                    bucket: &self.bucket,
                    name: key.as_str(),
                },
            },
        };

        let response = self
            .http
            .post(format!("{}/jobs", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubmissionError::Rejected {
                key: key.to_string(),
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let started: StartResponse = response
            .json()
            .await
            .map_err(|e| SubmissionError::InvalidResponse(e.to_string()))?;
        Ok(started.job_id)
    }

    async fn poll(&self, job_id: &str) -> Result<JobPoll, ServiceError> {
        let first = self.fetch_page(job_id, None).await?;

        if !first.job_status.has_results() {
            return Ok(JobPoll {
                status: first.job_status,
                status_message: first.status_message,
                result: None,
            });
        }

        let mut documents = first.expense_documents;
        let mut next_token = first.next_token;
        let mut pages = 1;
        while let Some(token) = next_token.take() {
            if pages >= MAX_RESULT_PAGES {
                return Err(ServiceError::InvalidResponse(format!(
                    "job {job_id} returned more than {MAX_RESULT_PAGES} result pages"
                )));
            }
            debug!("Fetching result page {} for job {}", pages + 1, job_id);
            let page = self.fetch_page(job_id, Some(&token)).await?;
            documents.extend(page.expense_documents);
            next_token = page.next_token;
            pages += 1;
        }

        Ok(JobPoll {
            status: first.job_status,
            status_message: first.status_message,
            result: Some(RawExtractionResult {
                expense_documents: documents,
            }),
        })
    }
}
