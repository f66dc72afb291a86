//! In-memory stand-ins for the remote store and the local exports.

use crate::crm::{BulkApi, BulkOperation, CrmError, JobInfo, JobState, ResultPage};
use crate::records::{FieldValue, Record, RecordBatch};
use crate::sync::driver::RemoteStore;
use crate::sync::repositories::{LocalRecordRepository, LocalSource};
use crate::sync::types::{JobReport, SyncError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryRecordRepository {
	sources: HashMap<LocalSource, Vec<Record>>,
}

impl InMemoryRecordRepository {
	pub fn with(mut self, source: LocalSource, records: Vec<Record>) -> Self {
		self.sources.insert(source, records);
		self
	}
}

#[async_trait]
impl LocalRecordRepository for InMemoryRecordRepository {
	async fn load(&self, source: LocalSource) -> Result<Vec<Record>, SyncError> {
		self.sources
			.get(&source)
			.cloned()
			.ok_or_else(|| SyncError::LocalDataError(format!("{} not loaded", source)))
	}
}

/// Remote store that keeps rows per object and answers `SELECT a, b FROM X` queries
#[derive(Default)]
pub struct FakeRemoteStore {
	objects: Mutex<HashMap<String, Vec<Record>>>,
	submissions: Mutex<Vec<(BulkOperation, RecordBatch)>>,
	next_id: Mutex<u32>,
}

impl FakeRemoteStore {
	pub fn seed(&self, object: &str, rows: Vec<Record>) {
		self.objects
			.lock()
			.unwrap()
			.entry(object.to_string())
			.or_default()
			.extend(rows);
	}

	pub fn rows(&self, object: &str) -> Vec<Record> {
		self.objects
			.lock()
			.unwrap()
			.get(object)
			.cloned()
			.unwrap_or_default()
	}

	pub fn submissions(&self) -> Vec<(BulkOperation, RecordBatch)> {
		self.submissions.lock().unwrap().clone()
	}

	fn parse_query(soql: &str) -> (Vec<String>, String) {
		let rest = soql.trim().trim_start_matches("SELECT").trim();
		let (fields, object) = rest.split_once(" FROM ").unwrap();
		(
			fields.split(',').map(|f| f.trim().to_string()).collect(),
			object.trim().to_string(),
		)
	}

	fn assign_id(&self, object: &str, record: Record) -> Record {
		let mut next = self.next_id.lock().unwrap();
		*next += 1;
		let prefix = &object[..3.min(object.len())];
		let record = record.with("Id", format!("{}{:05}", prefix, *next));
		if object == "Contact" && !record.contains("Name") {
			let name = format!(
				"{} {}",
				record.get("FirstName").to_cell(),
				record.get("LastName").to_cell()
			);
			return record.with("Name", name.trim().to_string());
		}
		record
	}
}

#[async_trait]
impl RemoteStore for FakeRemoteStore {
	async fn query(&self, soql: &str) -> Result<Vec<Record>, SyncError> {
		let (fields, object) = Self::parse_query(soql);
		let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
		Ok(self
			.rows(&object)
			.iter()
			.map(|row| {
				fields
					.iter()
					.fold(Record::new(), |out, field| out.with(*field, row.get(field).clone()))
			})
			.collect())
	}

	async fn submit(
		&self,
		operation: BulkOperation,
		batch: &RecordBatch,
	) -> Result<JobReport, SyncError> {
		let object = batch.kind.sobject();
		if batch.is_empty() {
			return Ok(JobReport::skipped(operation, object));
		}
		self.submissions
			.lock()
			.unwrap()
			.push((operation, batch.clone()));

		match operation {
			BulkOperation::Insert => {
				let rows: Vec<Record> = batch
					.rows
					.iter()
					.map(|row| self.assign_id(object, row.clone()))
					.collect();
				self.seed(object, rows);
			}
			BulkOperation::Update => {
				let mut objects = self.objects.lock().unwrap();
				let stored = objects.entry(object.to_string()).or_default();
				for change in &batch.rows {
					for row in stored.iter_mut().filter(|row| row.get("Id") == change.get("Id")) {
						*row = change
							.field_names()
							.fold(row.clone(), |row, field| row.with(field, change.get(field).clone()));
					}
				}
			}
			BulkOperation::Delete => {
				let mut objects = self.objects.lock().unwrap();
				let stored = objects.entry(object.to_string()).or_default();
				stored.retain(|row| !batch.rows.iter().any(|gone| gone.get("Id") == row.get("Id")));
			}
			BulkOperation::Query => {}
		}

		Ok(JobReport {
			job_id: Some(format!("750{:05}", self.submissions.lock().unwrap().len())),
			operation,
			object: object.to_string(),
			submitted: batch.len(),
			processed: batch.len() as u64,
			failed: 0,
			failure_detail: None,
		})
	}
}

/// Scripted `BulkApi`: status calls pop states off a queue, result calls pop pages
#[derive(Default)]
pub struct ScriptedApi {
	pub states: Mutex<VecDeque<JobState>>,
	pub status_calls: Mutex<u32>,
	pub pages: Mutex<VecDeque<ResultPage>>,
	pub result_calls: Mutex<u32>,
	pub uploads: Mutex<Vec<String>>,
	pub operations: Mutex<Vec<BulkOperation>>,
	pub created: Mutex<u32>,
	pub failed_records: u64,
	pub failed_results_unavailable: bool,
}

impl ScriptedApi {
	pub fn with_states(states: &[JobState]) -> Self {
		Self {
			states: Mutex::new(states.iter().copied().collect()),
			..Default::default()
		}
	}

	fn status(&self) -> JobInfo {
		*self.status_calls.lock().unwrap() += 1;
		let state = self
			.states
			.lock()
			.unwrap()
			.pop_front()
			.unwrap_or(JobState::InProgress);
		JobInfo {
			id: "750J".to_string(),
			state,
			number_records_processed: Some(2),
			number_records_failed: Some(self.failed_records),
			error_message: (state == JobState::Failed).then(|| "InvalidBatch".to_string()),
		}
	}

	fn job(&self) -> JobInfo {
		*self.created.lock().unwrap() += 1;
		JobInfo {
			id: "750J".to_string(),
			state: JobState::Open,
			number_records_processed: None,
			number_records_failed: None,
			error_message: None,
		}
	}
}

#[async_trait]
impl BulkApi for ScriptedApi {
	async fn create_query_job(&self, _query: &str) -> Result<JobInfo, CrmError> {
		Ok(self.job())
	}

	async fn query_job_status(&self, _job_id: &str) -> Result<JobInfo, CrmError> {
		Ok(self.status())
	}

	async fn query_results(
		&self,
		_job_id: &str,
		_locator: Option<&str>,
	) -> Result<ResultPage, CrmError> {
		*self.result_calls.lock().unwrap() += 1;
		Ok(self.pages.lock().unwrap().pop_front().unwrap_or(ResultPage {
			csv: String::new(),
			next_locator: None,
		}))
	}

	async fn create_ingest_job(
		&self,
		operation: BulkOperation,
		_object: &str,
	) -> Result<JobInfo, CrmError> {
		self.operations.lock().unwrap().push(operation);
		Ok(self.job())
	}

	async fn upload_job_data(&self, _job_id: &str, csv: String) -> Result<(), CrmError> {
		self.uploads.lock().unwrap().push(csv);
		Ok(())
	}

	async fn close_ingest_job(&self, _job_id: &str) -> Result<JobInfo, CrmError> {
		Ok(self.job())
	}

	async fn ingest_job_status(&self, _job_id: &str) -> Result<JobInfo, CrmError> {
		Ok(self.status())
	}

	async fn failed_results(&self, _job_id: &str) -> Result<String, CrmError> {
		if self.failed_results_unavailable {
			return Err(CrmError::ApiError {
				status: 503,
				body: "Service Unavailable".to_string(),
			});
		}
		Ok("\"sf__Id\",\"sf__Error\",Name\n\"\",\"REQUIRED_FIELD_MISSING\",X\n".to_string())
	}
}

pub fn row(pairs: &[(&str, &str)]) -> Record {
	Record::from_pairs(pairs.iter().map(|(k, v)| (*k, FieldValue::from_cell(v))))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::records::RecordKind;

	#[tokio::test]
	async fn test_delete_removes_rows_by_id() {
		let remote = FakeRemoteStore::default();
		remote.seed(
			"Food_Rescue__c",
			vec![
				row(&[("Id", "a0B1"), ("Rescue_Id__c", "R1")]),
				row(&[("Id", "a0B2"), ("Rescue_Id__c", "R2")]),
			],
		);
		let batch = RecordBatch::new(RecordKind::RescueEvent, vec![row(&[("Id", "a0B1")])]);
		let report = remote.submit(BulkOperation::Delete, &batch).await.unwrap();

		assert_eq!(report.processed, 1);
		let left = remote.rows("Food_Rescue__c");
		assert_eq!(left.len(), 1);
		assert_eq!(left[0].text("Rescue_Id__c"), Some("R2"));
	}
}
