//! Types for the CRM bulk API control messages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a bulk job as reported by the remote store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobState {
    /// Job created, data not yet attached
    Open,
    /// Client signalled that all data is attached
    UploadComplete,
    /// Remote side is processing the job
    InProgress,
    /// Job finished; individual records may still have failed
    JobComplete,
    /// Job failed as a whole
    Failed,
    /// Job was aborted
    Aborted,
    /// Any state this client does not know about; treated as still in progress
    #[serde(other)]
    Unknown,
}

impl JobState {
    /// Check if the job can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::JobComplete | JobState::Failed | JobState::Aborted
        )
    }

    /// Check if the job ended without processing its data
    pub fn is_failure(&self) -> bool {
        matches!(self, JobState::Failed | JobState::Aborted)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Kind of work a bulk job performs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BulkOperation {
    Insert,
    Update,
    /// Remove records by `Id`
    #[allow(dead_code)]
    Delete,
    Query,
}

impl BulkOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperation::Insert => "insert",
            BulkOperation::Update => "update",
            BulkOperation::Delete => "delete",
            BulkOperation::Query => "query",
        }
    }
}

impl fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job description returned by every create, close and status call.
///
/// Only the fields this client reads are modelled; the remote store sends many more.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    /// Opaque job identifier
    pub id: String,
    /// Current lifecycle state
    pub state: JobState,
    /// Records processed so far (ingest jobs only)
    #[serde(default)]
    pub number_records_processed: Option<u64>,
    /// Records that failed (ingest jobs only)
    #[serde(default)]
    pub number_records_failed: Option<u64>,
    /// Remote explanation for a failed job
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Body of a create-query-job request
#[derive(Debug, Clone, Serialize)]
pub struct CreateQueryJobRequest<'a> {
    pub operation: BulkOperation,
    pub query: &'a str,
}

/// Body of a create-ingest-job request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIngestJobRequest<'a> {
    pub operation: BulkOperation,
    pub object: &'a str,
    pub content_type: &'static str,
    pub line_ending: &'static str,
}

impl<'a> CreateIngestJobRequest<'a> {
    pub fn csv(operation: BulkOperation, object: &'a str) -> Self {
        Self {
            operation,
            object,
            content_type: "CSV",
            line_ending: "LF",
        }
    }
}

/// Body of the state change that closes an ingest job
#[derive(Debug, Clone, Serialize)]
pub struct JobStateChange {
    pub state: JobState,
}

/// One page of query results
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    /// CSV text with a header row
    pub csv: String,
    /// Locator of the next page, if any
    pub next_locator: Option<String>,
}

/// Error types for the bulk API transport and remote rejections
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("Remote store rejected the request (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    AuthError(String),
}
