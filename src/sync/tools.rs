//! Maintenance reports and one-off fixes run outside the main reconciliation.

use crate::crm::BulkOperation;
use crate::records::hierarchy::NAME;
use crate::records::mapping::{RESCUE_COMMENTS, date_field, require_columns};
use crate::records::matcher::{Duplicates, RemoteIndex, distinct, find_duplicates};
use crate::records::{Record, RecordBatch, RecordKind};
use crate::sync::driver::RemoteStore;
use crate::sync::repositories::{LocalRecordRepository, LocalSource};
use crate::sync::stages::{
	ACCOUNT_QUERY, CONTACT_QUERY, ID, SyncSettings, accounts_of_type, affiliated_contacts,
};
use crate::sync::types::{JobReport, SyncError};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use tracing::info;

const RESCUE_STATE_QUERY: &str = "SELECT Rescue_Id__c, State__c FROM Food_Rescue__c";
const RESCUE_COMMENT_QUERY: &str = "SELECT Id, Rescue_Id__c, Comments__c FROM Food_Rescue__c";

const INCOMPLETE_COLUMNS: &[&str] = &["rescue_id", "pickup_start", "rescue_state", "rescue_detail_url"];

/// Which side of a discrepancy report to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DiscrepancyDirection {
	/// Completed remotely, not completed in the local export
	RemoteOnly,
	/// Completed in the local export, missing remotely
	LocalOnly,
}

/// Completed rescue IDs present on one side only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancies {
	pub direction: DiscrepancyDirection,
	pub rescue_ids: Vec<String>,
}

impl Discrepancies {
	pub fn count(&self) -> usize {
		self.rescue_ids.len()
	}
}

fn is_completed(state: &str) -> bool {
	matches!(state.to_lowercase().as_str(), "complete" | "completed")
}

fn is_finished(state: &str) -> bool {
	is_completed(state) || matches!(state.to_lowercase().as_str(), "canceled" | "cancelled")
}

pub struct MaintenanceTools<'a> {
	remote: &'a dyn RemoteStore,
	local: &'a dyn LocalRecordRepository,
	settings: &'a SyncSettings,
}

impl<'a> MaintenanceTools<'a> {
	pub fn new(
		remote: &'a dyn RemoteStore,
		local: &'a dyn LocalRecordRepository,
		settings: &'a SyncSettings,
	) -> Self {
		Self {
			remote,
			local,
			settings,
		}
	}

	/// Remote donor or partner accounts that share a name
	pub async fn duplicate_accounts(&self, kind: RecordKind) -> Result<Duplicates, SyncError> {
		let record_type_id = match kind {
			RecordKind::DonorAccount => &self.settings.donor_record_type,
			RecordKind::PartnerAccount => &self.settings.partner_record_type,
			other => {
				return Err(SyncError::LocalDataError(format!(
					"{} records are not accounts",
					other
				)));
			}
		};
		let accounts = accounts_of_type(self.remote.query(ACCOUNT_QUERY).await?, record_type_id);
		let duplicates = find_duplicates(&accounts, NAME);
		info!("{} duplicate {} accounts", duplicates.rows().len(), kind);
		Ok(duplicates)
	}

	/// Remote volunteer contacts that share a name
	pub async fn duplicate_volunteers(&self) -> Result<Duplicates, SyncError> {
		let contacts = affiliated_contacts(
			self.remote.query(CONTACT_QUERY).await?,
			&self.settings.volunteer_affiliation,
		);
		let duplicates = find_duplicates(&contacts, NAME);
		info!("{} duplicate volunteer contacts", duplicates.rows().len());
		Ok(duplicates)
	}

	/// Local rescues picked up before `today` that are neither completed nor canceled
	pub async fn incomplete_rescues(&self, today: NaiveDate) -> Result<Vec<Record>, SyncError> {
		let rescues = self.local.load(LocalSource::Rescues).await?;
		require_columns("rescues", &rescues, INCOMPLETE_COLUMNS)?;

		let overdue = date_field(rescues, "pickup_start")
			.into_iter()
			.filter(|record| !record.text("rescue_state").is_some_and(is_finished))
			.filter(|record| {
				record
					.get("pickup_start")
					.as_date()
					.is_some_and(|pickup| pickup < today)
			})
			.map(|record| record.select(INCOMPLETE_COLUMNS))
			.collect();
		Ok(distinct(overdue))
	}

	/// Completed rescues known to only one side
	pub async fn rescue_discrepancies(
		&self,
		direction: DiscrepancyDirection,
	) -> Result<Discrepancies, SyncError> {
		let remote: BTreeSet<String> = self
			.remote
			.query(RESCUE_STATE_QUERY)
			.await?
			.iter()
			.filter(|record| record.text("State__c").is_some_and(is_completed))
			.filter_map(|record| record.get("Rescue_Id__c").key())
			.collect();

		let rescues = self.local.load(LocalSource::Rescues).await?;
		require_columns("rescues", &rescues, &["rescue_id", "rescue_state"])?;
		let local: BTreeSet<String> = rescues
			.iter()
			.filter(|record| record.text("rescue_state").is_some_and(is_completed))
			.filter_map(|record| record.get("rescue_id").key())
			.collect();

		let rescue_ids = match direction {
			DiscrepancyDirection::RemoteOnly => remote.difference(&local).cloned().collect(),
			DiscrepancyDirection::LocalOnly => local.difference(&remote).cloned().collect(),
		};
		Ok(Discrepancies {
			direction,
			rescue_ids,
		})
	}

	/// Copy local comments onto remote rescues that have none
	pub async fn update_rescue_comments(&self) -> Result<JobReport, SyncError> {
		let missing: Vec<Record> = self
			.remote
			.query(RESCUE_COMMENT_QUERY)
			.await?
			.into_iter()
			.filter(|record| record.get("Comments__c").is_null())
			.collect();

		let comments: Vec<Record> = RESCUE_COMMENTS
			.apply(&self.local.load(LocalSource::RescueComments).await?)?
			.into_iter()
			.filter(|record| !record.get("Comments").is_null())
			.collect();
		let index = RemoteIndex::build(&comments, "Rescue ID", "Comments", self.settings.join_policy);

		let mut updates = Vec::new();
		for rescue in &missing {
			let Some(rescue_id) = rescue.get("Rescue_Id__c").key() else {
				continue;
			};
			if let Some(comment) = index.lookup(&rescue_id)? {
				updates.push(Record::from_pairs([
					(ID, rescue.get(ID).clone()),
					("Comments__c", comment.clone()),
				]));
			}
		}
		info!(
			"{} remote rescues without comments, {} can be filled from the export",
			missing.len(),
			updates.len()
		);

		self.remote
			.submit(
				BulkOperation::Update,
				&RecordBatch::new(RecordKind::RescueComment, updates),
			)
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::records::FieldValue;
	use crate::crm::{JobState, ResultPage};
	use crate::sync::driver::BulkJobDriver;
	use crate::sync::poll::PollSettings;
	use crate::sync::testing::{FakeRemoteStore, InMemoryRecordRepository, ScriptedApi, row};
	use std::time::Duration;

	fn rescue(id: &str, pickup: &str, state: &str) -> Record {
		row(&[
			("rescue_id", id),
			("pickup_start", pickup),
			("rescue_state", state),
			("rescue_detail_url", "https://admin.example.org/rescues/1"),
			("food_type", "Produce"),
		])
	}

	#[tokio::test]
	async fn test_duplicate_accounts_by_record_type() {
		let remote = FakeRemoteStore::default();
		remote.seed(
			"Account",
			vec![
				row(&[("Id", "1"), ("Name", "Aldi"), ("RecordTypeId", "0123t000000YYv2AAG")]),
				row(&[("Id", "2"), ("Name", "Aldi "), ("RecordTypeId", "0123t000000YYv2AAG")]),
				row(&[("Id", "3"), ("Name", "Aldi"), ("RecordTypeId", "0123t000000YYv3AAG")]),
				row(&[("Id", "4"), ("Name", "Giant Eagle"), ("RecordTypeId", "0123t000000YYv2AAG")]),
			],
		);
		let local = InMemoryRecordRepository::default();
		let settings = SyncSettings::default();
		let tools = MaintenanceTools::new(&remote, &local, &settings);

		let donors = tools.duplicate_accounts(RecordKind::DonorAccount).await.unwrap();
		let ids: Vec<&str> = donors.rows().iter().filter_map(|r| r.text("Id")).collect();
		assert_eq!(ids, vec!["1", "2"]);

		let partners = tools.duplicate_accounts(RecordKind::PartnerAccount).await.unwrap();
		assert_eq!(partners, Duplicates::None);

		assert!(tools.duplicate_accounts(RecordKind::RescueEvent).await.is_err());
	}

	#[tokio::test]
	async fn test_incomplete_rescues_before_today() {
		let remote = FakeRemoteStore::default();
		let local = InMemoryRecordRepository::default().with(
			LocalSource::Rescues,
			vec![
				rescue("1", "2023-03-01 10:00:00", "Scheduled"),
				rescue("1", "2023-03-01 10:00:00", "Scheduled"),
				rescue("2", "2023-03-01 10:00:00", "Complete"),
				rescue("3", "2023-03-02 10:00:00", "Canceled"),
				rescue("4", "2023-03-09 10:00:00", "Scheduled"),
			],
		);
		let settings = SyncSettings::default();
		let tools = MaintenanceTools::new(&remote, &local, &settings);

		let today = NaiveDate::from_ymd_opt(2023, 3, 8).unwrap();
		let overdue = tools.incomplete_rescues(today).await.unwrap();
		assert_eq!(overdue.len(), 1);
		assert_eq!(overdue[0].text("rescue_id"), Some("1"));
		let columns: Vec<&str> = overdue[0].field_names().collect();
		assert_eq!(columns, INCOMPLETE_COLUMNS);
	}

	#[tokio::test]
	async fn test_discrepancies_in_both_directions() {
		let remote = FakeRemoteStore::default();
		remote.seed(
			"Food_Rescue__c",
			vec![
				row(&[("Rescue_Id__c", "10"), ("State__c", "completed")]),
				row(&[("Rescue_Id__c", "11"), ("State__c", "completed")]),
				row(&[("Rescue_Id__c", "12"), ("State__c", "canceled")]),
			],
		);
		let local = InMemoryRecordRepository::default().with(
			LocalSource::Rescues,
			vec![
				rescue("10", "2023-03-01", "Complete"),
				rescue("12", "2023-03-01", "Complete"),
				rescue("13", "2023-03-01", "Complete"),
				rescue("11", "2023-03-01", "Canceled"),
			],
		);
		let settings = SyncSettings::default();
		let tools = MaintenanceTools::new(&remote, &local, &settings);

		let remote_only = tools
			.rescue_discrepancies(DiscrepancyDirection::RemoteOnly)
			.await
			.unwrap();
		assert_eq!(remote_only.rescue_ids, vec!["11"]);

		let local_only = tools
			.rescue_discrepancies(DiscrepancyDirection::LocalOnly)
			.await
			.unwrap();
		assert_eq!(local_only.rescue_ids, vec!["12", "13"]);
		assert_eq!(local_only.count(), 2);
	}

	#[tokio::test]
	async fn test_comments_fill_only_empty_remote_rows() {
		let remote = FakeRemoteStore::default();
		remote.seed(
			"Food_Rescue__c",
			vec![
				row(&[("Id", "a01"), ("Rescue_Id__c", "100"), ("Comments__c", "")]),
				row(&[("Id", "a02"), ("Rescue_Id__c", "101"), ("Comments__c", "kept")]),
				row(&[("Id", "a03"), ("Rescue_Id__c", "100"), ("Comments__c", "")]),
				row(&[("Id", "a04"), ("Rescue_Id__c", "102"), ("Comments__c", "")]),
			],
		);
		let local = InMemoryRecordRepository::default().with(
			LocalSource::RescueComments,
			vec![
				row(&[("Rescue ID", "100"), ("Comments", "Left at back door")]),
				row(&[("Rescue ID", "101"), ("Comments", "replacement")]),
				row(&[("Rescue ID", "102"), ("Comments", "")]),
			],
		);
		let settings = SyncSettings::default();
		let tools = MaintenanceTools::new(&remote, &local, &settings);

		let report = tools.update_rescue_comments().await.unwrap();
		assert_eq!(report.operation, BulkOperation::Update);
		assert_eq!(report.submitted, 2);

		let rows = remote.rows("Food_Rescue__c");
		assert_eq!(rows[0].text("Comments__c"), Some("Left at back door"));
		assert_eq!(rows[1].text("Comments__c"), Some("kept"));
		assert_eq!(rows[2].text("Comments__c"), Some("Left at back door"));
		assert_eq!(rows[3].get("Comments__c"), &FieldValue::Null);
	}

	#[tokio::test]
	async fn test_comment_update_carries_rejected_rows() {
		let api = ScriptedApi {
			failed_records: 1,
			..ScriptedApi::with_states(&[JobState::JobComplete, JobState::JobComplete])
		};
		api.pages.lock().unwrap().push_back(ResultPage {
			csv: "\"Id\",\"Rescue_Id__c\",\"Comments__c\"\n\"a01\",\"100\",\"\"\n".to_string(),
			next_locator: None,
		});
		let poll = PollSettings::new(Duration::from_millis(1), None);
		let remote = BulkJobDriver::new(api, poll, poll);
		let local = InMemoryRecordRepository::default().with(
			LocalSource::RescueComments,
			vec![row(&[("Rescue ID", "100"), ("Comments", "Left at back door")])],
		);
		let settings = SyncSettings::default();
		let tools = MaintenanceTools::new(&remote, &local, &settings);

		let report = tools.update_rescue_comments().await.unwrap();
		assert_eq!(report.submitted, 1);
		assert_eq!(report.failed, 1);
		assert!(
			report
				.failure_detail
				.as_deref()
				.is_some_and(|detail| detail.contains("REQUIRED_FIELD_MISSING"))
		);
	}
}
