//! Bulk job driver.
//!
//! Turns the job-oriented `BulkApi` into the two operations the sync stages need: run a query
//! and get records back, or submit a batch and get a report back. Each job is created, fed,
//! closed and polled to a terminal state before the call returns.

use super::poll::{PollOutcome, PollSettings, poll_until};
use super::types::{JobReport, SyncError};
use crate::crm::{BulkApi, BulkOperation, JobInfo};
use crate::records::codec::{parse_records, render_records};
use crate::records::{Record, RecordBatch};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Remote record store as seen by the sync stages
#[async_trait]
pub trait RemoteStore: Send + Sync {
	/// Run a SOQL query and return every result row
	async fn query(&self, soql: &str) -> Result<Vec<Record>, SyncError>;

	/// Submit `batch` as one ingest job. Empty batches are not submitted.
	async fn submit(
		&self,
		operation: BulkOperation,
		batch: &RecordBatch,
	) -> Result<JobReport, SyncError>;
}

/// `RemoteStore` backed by bulk API 2.0 jobs
pub struct BulkJobDriver<A: BulkApi> {
	api: A,
	query_poll: PollSettings,
	ingest_poll: PollSettings,
}

impl<A: BulkApi> BulkJobDriver<A> {
	pub fn new(api: A, query_poll: PollSettings, ingest_poll: PollSettings) -> Self {
		Self {
			api,
			query_poll,
			ingest_poll,
		}
	}

	/// Map a terminal failure state to `JobFailed`
	fn check_failure(info: &JobInfo, operation: BulkOperation, object: &str) -> Result<(), SyncError> {
		if info.state.is_failure() {
			return Err(SyncError::JobFailed {
				job_id: info.id.clone(),
				operation,
				object: object.to_string(),
				state: info.state.to_string(),
				message: info
					.error_message
					.clone()
					.unwrap_or_else(|| "no error message".to_string()),
			});
		}
		Ok(())
	}

	fn finish(outcome: PollOutcome<JobInfo>, job_id: &str) -> Result<JobInfo, SyncError> {
		match outcome {
			PollOutcome::Ready { value, attempts } => {
				debug!("Job {} finished after {} status checks", job_id, attempts);
				Ok(value)
			}
			PollOutcome::TimedOut { attempts } => Err(SyncError::JobTimedOut {
				job_id: job_id.to_string(),
				attempts,
			}),
		}
	}

	async fn wait_for_query(&self, job_id: &str) -> Result<JobInfo, SyncError> {
		let outcome = poll_until(&self.query_poll, move |attempt| async move {
			let info = self
				.api
				.query_job_status(job_id)
				.await
				.map_err(SyncError::from)?;
			debug!("Query job {} is {} (check {})", job_id, info.state, attempt);
			Self::check_failure(&info, BulkOperation::Query, "query")?;
			Ok::<_, SyncError>(info.state.is_terminal().then_some(info))
		})
		.await?;
		Self::finish(outcome, job_id)
	}

	async fn wait_for_ingest(
		&self,
		job_id: &str,
		operation: BulkOperation,
		object: &str,
	) -> Result<JobInfo, SyncError> {
		let outcome = poll_until(&self.ingest_poll, move |attempt| async move {
			let info = self
				.api
				.ingest_job_status(job_id)
				.await
				.map_err(SyncError::from)?;
			debug!("Ingest job {} is {} (check {})", job_id, info.state, attempt);
			Self::check_failure(&info, operation, object)?;
			Ok::<_, SyncError>(info.state.is_terminal().then_some(info))
		})
		.await?;
		Self::finish(outcome, job_id)
	}
}

#[async_trait]
impl<A: BulkApi> RemoteStore for BulkJobDriver<A> {
	async fn query(&self, soql: &str) -> Result<Vec<Record>, SyncError> {
		let job = self.api.create_query_job(soql).await?;
		debug!("Created query job {} for: {}", job.id, soql);
		self.wait_for_query(&job.id).await?;

		let mut records = Vec::new();
		let mut locator: Option<String> = None;
		loop {
			let page = self.api.query_results(&job.id, locator.as_deref()).await?;
			records.extend(parse_records(&page.csv)?);
			match page.next_locator {
				Some(next) => locator = Some(next),
				None => break,
			}
		}

		info!("Query job {} returned {} records", job.id, records.len());
		Ok(records)
	}

	async fn submit(
		&self,
		operation: BulkOperation,
		batch: &RecordBatch,
	) -> Result<JobReport, SyncError> {
		let object = batch.kind.sobject();
		if batch.is_empty() {
			info!("No {} records to {}, skipping job", batch.kind, operation);
			return Ok(JobReport::skipped(operation, object));
		}

		let payload = render_records(&batch.rows)?;
		let job = self.api.create_ingest_job(operation, object).await?;
		info!(
			"Created {} job {} for {} {} records",
			operation,
			job.id,
			batch.len(),
			batch.kind
		);
		self.api.upload_job_data(&job.id, payload).await?;
		self.api.close_ingest_job(&job.id).await?;

		info!("Waiting for job {} to complete...", job.id);
		let info = self.wait_for_ingest(&job.id, operation, object).await?;
		let processed = info.number_records_processed.unwrap_or(0);
		let failed = info.number_records_failed.unwrap_or(0);
		info!(
			"Job {} results: {} records processed, {} failed",
			job.id, processed, failed
		);

		let failure_detail = if failed > 0 {
			match self.api.failed_results(&job.id).await {
				Ok(detail) => {
					warn!("Job {} rejected {} records:\n{}", job.id, failed, detail);
					Some(detail)
				}
				Err(e) => {
					warn!("Could not fetch failed results for job {}: {}", job.id, e);
					None
				}
			}
		} else {
			None
		};

		Ok(JobReport {
			job_id: Some(job.id),
			operation,
			object: object.to_string(),
			submitted: batch.len(),
			processed,
			failed,
			failure_detail,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::crm::{JobState, ResultPage};
	use crate::records::RecordKind;
	use crate::sync::testing::ScriptedApi;
	use std::time::Duration;

	fn fast() -> PollSettings {
		PollSettings::new(Duration::from_millis(1), None)
	}

	fn batch() -> RecordBatch {
		RecordBatch::new(
			RecordKind::DonorAccount,
			vec![
				Record::from_pairs([("Name", "A")]),
				Record::from_pairs([("Name", "B")]),
			],
		)
	}

	#[tokio::test]
	async fn test_submit_polls_until_complete() {
		let api = ScriptedApi::with_states(&[
			JobState::InProgress,
			JobState::InProgress,
			JobState::JobComplete,
		]);
		let driver = BulkJobDriver::new(api, fast(), fast());
		let report = driver.submit(BulkOperation::Insert, &batch()).await.unwrap();

		assert_eq!(*driver.api.status_calls.lock().unwrap(), 3);
		assert_eq!(report.job_id.as_deref(), Some("750J"));
		assert_eq!(report.submitted, 2);
		assert_eq!(report.processed, 2);
		assert_eq!(report.failed, 0);
		assert_eq!(driver.api.uploads.lock().unwrap()[0], "Name\nA\nB\n");
	}

	#[tokio::test]
	async fn test_failed_job_errors_without_another_poll() {
		let api = ScriptedApi::with_states(&[JobState::Failed, JobState::JobComplete]);
		let driver = BulkJobDriver::new(api, fast(), fast());
		let result = driver.submit(BulkOperation::Insert, &batch()).await;

		assert!(matches!(
			result,
			Err(SyncError::JobFailed { ref message, .. }) if message == "InvalidBatch"
		));
		assert_eq!(*driver.api.status_calls.lock().unwrap(), 1);
	}

	#[tokio::test]
	async fn test_aborted_ingest_job_is_fatal() {
		let api = ScriptedApi::with_states(&[JobState::InProgress, JobState::Aborted]);
		let driver = BulkJobDriver::new(api, fast(), fast());
		let result = driver.submit(BulkOperation::Update, &batch()).await;

		assert!(matches!(
			result,
			Err(SyncError::JobFailed { ref state, operation: BulkOperation::Update, .. })
				if state == "Aborted"
		));
		assert_eq!(*driver.api.status_calls.lock().unwrap(), 2);
	}

	#[tokio::test]
	async fn test_failed_query_job_is_fatal_before_results() {
		let api = ScriptedApi::with_states(&[JobState::InProgress, JobState::Failed]);
		let driver = BulkJobDriver::new(api, fast(), fast());
		let result = driver.query("SELECT Id FROM Account").await;

		assert!(matches!(
			result,
			Err(SyncError::JobFailed { ref message, operation: BulkOperation::Query, .. })
				if message == "InvalidBatch"
		));
		assert_eq!(*driver.api.status_calls.lock().unwrap(), 2);
		assert_eq!(*driver.api.result_calls.lock().unwrap(), 0);
	}

	#[tokio::test]
	async fn test_aborted_query_job_is_fatal() {
		let api = ScriptedApi::with_states(&[JobState::Aborted]);
		let driver = BulkJobDriver::new(api, fast(), fast());
		let result = driver.query("SELECT Id FROM Account").await;

		assert!(matches!(
			result,
			Err(SyncError::JobFailed { ref state, .. }) if state == "Aborted"
		));
		assert_eq!(*driver.api.result_calls.lock().unwrap(), 0);
	}

	#[tokio::test]
	async fn test_poll_budget_exhaustion_times_out() {
		let api = ScriptedApi::with_states(&[]);
		let settings = PollSettings::new(Duration::from_millis(1), Some(3));
		let driver = BulkJobDriver::new(api, fast(), settings);
		let result = driver.submit(BulkOperation::Insert, &batch()).await;

		assert!(matches!(result, Err(SyncError::JobTimedOut { attempts: 3, .. })));
	}

	#[tokio::test]
	async fn test_empty_batch_is_not_submitted() {
		let driver = BulkJobDriver::new(ScriptedApi::default(), fast(), fast());
		let empty = RecordBatch::new(RecordKind::RescueEvent, Vec::new());
		let report = driver.submit(BulkOperation::Insert, &empty).await.unwrap();

		assert!(report.is_skipped());
		assert_eq!(report.object, "Food_Rescue__c");
		assert_eq!(*driver.api.created.lock().unwrap(), 0);
	}

	#[tokio::test]
	async fn test_partial_failure_is_reported_not_fatal() {
		let api = ScriptedApi {
			failed_records: 1,
			..ScriptedApi::with_states(&[JobState::JobComplete])
		};
		let driver = BulkJobDriver::new(api, fast(), fast());
		let report = driver.submit(BulkOperation::Insert, &batch()).await.unwrap();

		assert_eq!(report.failed, 1);
		assert!(
			report
				.failure_detail
				.unwrap()
				.contains("REQUIRED_FIELD_MISSING")
		);
	}

	#[tokio::test]
	async fn test_unreadable_failed_results_do_not_fail_the_job() {
		let api = ScriptedApi {
			failed_records: 1,
			failed_results_unavailable: true,
			..ScriptedApi::with_states(&[JobState::JobComplete])
		};
		let driver = BulkJobDriver::new(api, fast(), fast());
		let report = driver.submit(BulkOperation::Insert, &batch()).await.unwrap();

		assert_eq!(report.failed, 1);
		assert_eq!(report.processed, 2);
		assert!(report.failure_detail.is_none());
	}

	#[tokio::test]
	async fn test_delete_job_uploads_ids() {
		let api = ScriptedApi::with_states(&[JobState::JobComplete]);
		let driver = BulkJobDriver::new(api, fast(), fast());
		let ids = RecordBatch::new(
			RecordKind::RescueEvent,
			vec![
				Record::from_pairs([("Id", "a0B01")]),
				Record::from_pairs([("Id", "a0B02")]),
			],
		);
		let report = driver.submit(BulkOperation::Delete, &ids).await.unwrap();

		assert_eq!(report.operation, BulkOperation::Delete);
		assert_eq!(report.object, "Food_Rescue__c");
		assert_eq!(
			*driver.api.operations.lock().unwrap(),
			vec![BulkOperation::Delete]
		);
		assert_eq!(driver.api.uploads.lock().unwrap()[0], "Id\na0B01\na0B02\n");
	}

	#[tokio::test]
	async fn test_query_concatenates_result_pages() {
		let api = ScriptedApi::with_states(&[JobState::UploadComplete, JobState::JobComplete]);
		api.pages.lock().unwrap().extend([
			ResultPage {
				csv: "\"Id\",\"Name\"\n\"001A\",\"Alpha\"\n".to_string(),
				next_locator: Some("MjAwMDAw".to_string()),
			},
			ResultPage {
				csv: "\"Id\",\"Name\"\n\"001B\",\"Beta\"\n".to_string(),
				next_locator: None,
			},
		]);
		let driver = BulkJobDriver::new(api, fast(), fast());
		let records = driver.query("SELECT Id, Name FROM Account").await.unwrap();

		assert_eq!(records.len(), 2);
		assert_eq!(records[1].text("Name"), Some("Beta"));
		assert_eq!(*driver.api.status_calls.lock().unwrap(), 2);
	}
}
