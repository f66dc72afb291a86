use crate::crm::{BulkOperation, CrmError};
use crate::records::RecordError;

/// Outcome of one submitted ingest job
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
	/// `None` when the batch was empty and nothing was submitted
	pub job_id: Option<String>,
	pub operation: BulkOperation,
	pub object: String,
	/// Rows sent in the batch
	pub submitted: usize,
	pub processed: u64,
	pub failed: u64,
	/// Failed-results CSV as returned by the remote store
	pub failure_detail: Option<String>,
}

impl JobReport {
	pub fn skipped(operation: BulkOperation, object: &str) -> Self {
		Self {
			job_id: None,
			operation,
			object: object.to_string(),
			submitted: 0,
			processed: 0,
			failed: 0,
			failure_detail: None,
		}
	}

	pub fn is_skipped(&self) -> bool {
		self.job_id.is_none()
	}
}

/// Error types for the sync layer
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("CRM error: {0}")]
	CrmError(#[from] CrmError),

	#[error("Record error: {0}")]
	RecordError(#[from] RecordError),

	#[error("{operation} job {job_id} on {object} ended in state {state}: {message}")]
	JobFailed {
		job_id: String,
		operation: BulkOperation,
		object: String,
		state: String,
		message: String,
	},

	#[error("Job {job_id} did not finish after {attempts} status checks")]
	JobTimedOut { job_id: String, attempts: u32 },

	#[error("Local data error: {0}")]
	LocalDataError(String),

	#[error("Sync incomplete: {0}")]
	IncompleteRun(String),
}
