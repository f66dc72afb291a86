//! Reconciliation stages.
//!
//! Each stage reconciles one record type: load the local export, map it, diff it against the
//! remote store, and insert whatever is missing. Stages share nothing but the `SyncContext`,
//! and run one at a time in the order the orchestrator gives them.

use crate::crm::BulkOperation;
use crate::records::hierarchy::{
	MissingParentPolicy, NAME, PARENT_NAME, RECORD_TYPE_ID, attach_parent_ids, plan_uploads,
	strip_parent_names,
};
use crate::records::mapping::{
	DONOR_ACCOUNTS, MappingTable, PARTNER_ACCOUNTS, RESCUE_EVENTS, VOLUNTEER_CONTACTS,
	VOLUNTEER_UPLOAD_COLUMNS, coerce_integer, date_field, require_columns, retain_integer,
	trim_decimal_zero,
};
use crate::records::matcher::{
	JoinPolicy, MatchKey, RemoteIndex, distinct, find_unmatched, lookup_join,
};
use crate::records::normalize::{normalize_field, normalize_fields};
use crate::records::{FieldValue, Record, RecordBatch, RecordKind};
use crate::sync::driver::RemoteStore;
use crate::sync::events::{EventDispatcher, SyncEvent};
use crate::sync::progress_tracker::SyncProgressTracker;
use crate::sync::repositories::{LocalRecordRepository, LocalSource};
use crate::sync::types::SyncError;
use tracing::{info, warn};

pub const ACCOUNT_QUERY: &str = "SELECT Id, Name, RecordTypeId FROM Account";
pub const CONTACT_QUERY: &str = "SELECT Id, Name, npsp__Primary_Affiliation__c FROM Contact";
pub const RESCUE_QUERY: &str = "SELECT Id, Rescue_Id__c, Food_Type__c, Weight__c FROM Food_Rescue__c";

pub const ID: &str = "Id";
pub const AFFILIATION: &str = "npsp__Primary_Affiliation__c";

const USER_STATE: &str = "user_state";
const ADMIN_MARKER: &str = "#admin";

const RESCUE_STATE: &str = "rescue_state";
const TOTAL_WEIGHT: &str = "total_weight";
const PICKUP_START: &str = "pickup_start";
const DONOR_LOCATION: &str = "donor_location_name";
const RECIPIENT_LOCATION: &str = "recipient_location_name";
const VOLUNTEER: &str = "volunteer";

/// Columns the rescue export must carry
const RESCUE_EXPORT_COLUMNS: &[&str] = &[
	"rescue_detail_url",
	"rescue_id",
	PICKUP_START,
	"food_type",
	"description",
	"rescue_type",
	RESCUE_STATE,
	"county",
	TOTAL_WEIGHT,
	DONOR_LOCATION,
	RECIPIENT_LOCATION,
	VOLUNTEER,
];

/// Record type IDs and matching behavior for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
	pub donor_record_type: String,
	pub partner_record_type: String,
	/// Account every volunteer contact is affiliated with
	pub volunteer_affiliation: String,
	pub join_policy: JoinPolicy,
	pub missing_parent: MissingParentPolicy,
}

impl Default for SyncSettings {
	fn default() -> Self {
		Self {
			donor_record_type: "0123t000000YYv2AAG".to_string(),
			partner_record_type: "0123t000000YYv3AAG".to_string(),
			volunteer_affiliation: "0013t00001teMBwAAM".to_string(),
			join_policy: JoinPolicy::FirstMatch,
			missing_parent: MissingParentPolicy::Abort,
		}
	}
}

/// Everything a stage may touch during a run
pub struct SyncContext<'a> {
	pub remote: &'a dyn RemoteStore,
	pub local: &'a dyn LocalRecordRepository,
	pub settings: &'a SyncSettings,
	pub event_dispatcher: &'a mut EventDispatcher,
	pub progress_tracker: &'a mut SyncProgressTracker,
}

impl<'a> SyncContext<'a> {
	pub fn new(
		remote: &'a dyn RemoteStore,
		local: &'a dyn LocalRecordRepository,
		settings: &'a SyncSettings,
		event_dispatcher: &'a mut EventDispatcher,
		progress_tracker: &'a mut SyncProgressTracker,
	) -> Self {
		Self {
			remote,
			local,
			settings,
			event_dispatcher,
			progress_tracker,
		}
	}

	/// Record `event` in the progress tracker and hand it to every handler
	pub async fn emit(&mut self, event: SyncEvent) -> Result<(), SyncError> {
		self.progress_tracker.record_event(&event);
		self.event_dispatcher.dispatch(&event).await
	}

	async fn insert(
		&mut self,
		stage: &'static str,
		kind: RecordKind,
		rows: Vec<Record>,
	) -> Result<(), SyncError> {
		let report = self
			.remote
			.submit(BulkOperation::Insert, &RecordBatch::new(kind, rows))
			.await?;
		self.emit(SyncEvent::JobFinished { stage, report }).await
	}

	async fn dropped(
		&mut self,
		stage: &'static str,
		reason: &'static str,
		count: usize,
	) -> Result<(), SyncError> {
		if count == 0 {
			return Ok(());
		}
		self.emit(SyncEvent::RowsDropped {
			stage,
			reason,
			count,
		})
		.await
	}
}

/// Trait for one reconciliation stage
#[async_trait::async_trait]
pub trait SyncStage: Send + Sync {
	/// Reconcile this stage's record type
	async fn run(&self, ctx: &mut SyncContext<'_>) -> Result<(), SyncError>;

	/// Get the name of this stage
	fn name(&self) -> &'static str;
}

/// Remote accounts of one record type, with normalized names
pub fn accounts_of_type(accounts: Vec<Record>, record_type_id: &str) -> Vec<Record> {
	let accounts = accounts
		.into_iter()
		.filter(|account| account.text(RECORD_TYPE_ID) == Some(record_type_id))
		.collect();
	normalize_field(accounts, NAME)
}

/// Remote contacts affiliated with `affiliation`, with normalized names
pub fn affiliated_contacts(contacts: Vec<Record>, affiliation: &str) -> Vec<Record> {
	let contacts = contacts
		.into_iter()
		.filter(|contact| contact.text(AFFILIATION) == Some(affiliation))
		.collect();
	normalize_field(contacts, NAME)
}

/// Donor or partner accounts, uploaded parents first
pub struct AccountStage {
	name: &'static str,
	kind: RecordKind,
	source: LocalSource,
	mapping: MappingTable,
}

impl AccountStage {
	pub fn donors() -> Self {
		Self {
			name: "Donors",
			kind: RecordKind::DonorAccount,
			source: LocalSource::Donors,
			mapping: DONOR_ACCOUNTS,
		}
	}

	pub fn partners() -> Self {
		Self {
			name: "Partners",
			kind: RecordKind::PartnerAccount,
			source: LocalSource::Partners,
			mapping: PARTNER_ACCOUNTS,
		}
	}

	fn record_type_id<'s>(&self, settings: &'s SyncSettings) -> &'s str {
		match self.kind {
			RecordKind::PartnerAccount => &settings.partner_record_type,
			_ => &settings.donor_record_type,
		}
	}

	async fn remote_accounts(
		&self,
		ctx: &SyncContext<'_>,
		record_type_id: &str,
	) -> Result<Vec<Record>, SyncError> {
		let accounts = ctx.remote.query(ACCOUNT_QUERY).await?;
		Ok(accounts_of_type(accounts, record_type_id))
	}

	fn upload_rows(records: Vec<Record>) -> Vec<Record> {
		trim_decimal_zero(strip_parent_names(records), "ShippingPostalCode")
	}
}

#[async_trait::async_trait]
impl SyncStage for AccountStage {
	async fn run(&self, ctx: &mut SyncContext<'_>) -> Result<(), SyncError> {
		let stage = self.name;
		let settings = ctx.settings;
		let record_type_id = self.record_type_id(settings);
		ctx.emit(SyncEvent::StageStarted { stage }).await?;

		let local = ctx.local.load(self.source).await?;
		let local = normalize_fields(self.mapping.apply(&local)?, &[NAME, PARENT_NAME]);
		let remote = self.remote_accounts(ctx, record_type_id).await?;

		let unmatched = find_unmatched(local, &remote, &MatchKey::field(NAME), settings.join_policy)?;
		ctx.emit(SyncEvent::UnmatchedFound {
			stage,
			count: unmatched.len(),
		})
		.await?;

		let index = RemoteIndex::build(&remote, NAME, ID, settings.join_policy);
		let plan = plan_uploads(unmatched, &index, record_type_id)?;
		info!(
			"{}: {} accounts in the first pass ({} new parents), {} waiting on a parent",
			stage,
			plan.first_pass.len(),
			plan.synthesized_parents,
			plan.second_pass.len()
		);

		ctx.insert(stage, self.kind, Self::upload_rows(plan.first_pass))
			.await?;

		if !plan.second_pass.is_empty() {
			let refreshed = self.remote_accounts(ctx, record_type_id).await?;
			let refreshed = RemoteIndex::build(&refreshed, NAME, ID, settings.join_policy);
			let attachment =
				attach_parent_ids(plan.second_pass, &refreshed, settings.missing_parent)?;
			ctx.dropped(stage, "parent account not found", attachment.skipped.len())
				.await?;
			ctx.insert(stage, self.kind, Self::upload_rows(attachment.ready))
				.await?;
		}

		ctx.emit(SyncEvent::StageCompleted { stage }).await
	}

	fn name(&self) -> &'static str {
		self.name
	}
}

/// Active volunteers as contacts affiliated with the volunteer account
pub struct VolunteerStage;

impl VolunteerStage {
	fn full_name(record: &Record) -> FieldValue {
		let parts: Vec<&str> = ["FirstName", "LastName"]
			.iter()
			.filter_map(|field| record.text(field))
			.collect();
		if parts.is_empty() {
			FieldValue::Null
		} else {
			FieldValue::text(parts.join(" "))
		}
	}
}

#[async_trait::async_trait]
impl SyncStage for VolunteerStage {
	async fn run(&self, ctx: &mut SyncContext<'_>) -> Result<(), SyncError> {
		let stage = self.name();
		let settings = ctx.settings;
		ctx.emit(SyncEvent::StageStarted { stage }).await?;

		let local = ctx.local.load(LocalSource::Volunteers).await?;
		require_columns(VOLUNTEER_CONTACTS.name, &local, &[USER_STATE])?;
		let total = local.len();
		let active: Vec<Record> = local
			.into_iter()
			.filter(|record| record.text(USER_STATE) == Some("Active"))
			.collect();
		ctx.dropped(stage, "volunteer not active", total - active.len())
			.await?;

		let mapped = VOLUNTEER_CONTACTS.apply(&active)?;
		let total = mapped.len();
		let people: Vec<Record> = mapped
			.into_iter()
			.filter(|record| {
				!record
					.text("LastName")
					.is_some_and(|name| name.contains(ADMIN_MARKER))
			})
			.map(|record| {
				let name = Self::full_name(&record);
				record.with(NAME, name)
			})
			.collect();
		ctx.dropped(stage, "admin account", total - people.len())
			.await?;

		let local = normalize_field(people, NAME);
		let contacts = ctx.remote.query(CONTACT_QUERY).await?;
		let remote = affiliated_contacts(contacts, &settings.volunteer_affiliation);

		let unmatched = find_unmatched(local, &remote, &MatchKey::field(NAME), settings.join_policy)?;
		ctx.emit(SyncEvent::UnmatchedFound {
			stage,
			count: unmatched.len(),
		})
		.await?;

		let rows = unmatched
			.into_iter()
			.map(|record| record.with(AFFILIATION, settings.volunteer_affiliation.as_str()))
			.collect();
		let rows = trim_decimal_zero(trim_decimal_zero(rows, "Phone"), "MailingPostalCode");
		let rows = rows
			.iter()
			.map(|record| record.select(VOLUNTEER_UPLOAD_COLUMNS))
			.collect();
		ctx.insert(stage, RecordKind::VolunteerContact, rows).await?;

		ctx.emit(SyncEvent::StageCompleted { stage }).await
	}

	fn name(&self) -> &'static str {
		"Volunteers"
	}
}

/// Finished rescues, linked to their donor, partner and volunteer
pub struct RescueStage;

impl RescueStage {
	fn match_key() -> MatchKey {
		MatchKey::pairs(&[
			("rescue_id", "Rescue_Id__c"),
			("food_type", "Food_Type__c"),
			(TOTAL_WEIGHT, "Weight__c"),
		])
	}

	/// Remote spelling of a finished rescue state; `None` for rescues still open
	fn finished_state(state: &str) -> Option<&'static str> {
		match state {
			"Complete" => Some("completed"),
			"Canceled" => Some("canceled"),
			_ => None,
		}
	}
}

#[async_trait::async_trait]
impl SyncStage for RescueStage {
	async fn run(&self, ctx: &mut SyncContext<'_>) -> Result<(), SyncError> {
		let stage = self.name();
		let settings = ctx.settings;
		let policy = settings.join_policy;
		ctx.emit(SyncEvent::StageStarted { stage }).await?;

		let local = ctx.local.load(LocalSource::Rescues).await?;
		require_columns(RESCUE_EVENTS.name, &local, RESCUE_EXPORT_COLUMNS)?;
		let (local, placeholders) = retain_integer(local, TOTAL_WEIGHT);
		ctx.dropped(stage, "weight not assigned", placeholders).await?;

		let remote = distinct(ctx.remote.query(RESCUE_QUERY).await?);
		let remote = coerce_integer(remote, "Weight__c");
		let unmatched = find_unmatched(local, &remote, &Self::match_key(), policy)?;
		ctx.emit(SyncEvent::UnmatchedFound {
			stage,
			count: unmatched.len(),
		})
		.await?;

		let total = unmatched.len();
		let finished: Vec<Record> = unmatched
			.into_iter()
			.filter_map(|record| {
				let state = Self::finished_state(record.text(RESCUE_STATE)?)?;
				Some(record.with(RESCUE_STATE, state))
			})
			.collect();
		ctx.dropped(stage, "rescue not complete or canceled", total - finished.len())
			.await?;

		if finished.is_empty() {
			info!("{}: no new finished rescues", stage);
			return ctx.emit(SyncEvent::StageCompleted { stage }).await;
		}

		let accounts = ctx.remote.query(ACCOUNT_QUERY).await?;
		let donors = accounts_of_type(accounts.clone(), &settings.donor_record_type);
		let partners = accounts_of_type(accounts, &settings.partner_record_type);
		let contacts = ctx.remote.query(CONTACT_QUERY).await?;
		let volunteers = affiliated_contacts(contacts, &settings.volunteer_affiliation);

		let rows = normalize_fields(finished, &[DONOR_LOCATION, RECIPIENT_LOCATION, VOLUNTEER]);
		let rows = lookup_join(
			rows,
			&RemoteIndex::build(&donors, NAME, ID, policy),
			DONOR_LOCATION,
			"Food_Donor_Account_Name__c",
		)?;
		let rows = lookup_join(
			rows,
			&RemoteIndex::build(&partners, NAME, ID, policy),
			RECIPIENT_LOCATION,
			"Agency_Name__c",
		)?;
		let rows = lookup_join(
			rows,
			&RemoteIndex::build(&volunteers, NAME, ID, policy),
			VOLUNTEER,
			"Volunteer_Name__c",
		)?;

		let unresolved = rows
			.iter()
			.filter(|record| record.get("Food_Donor_Account_Name__c").is_null())
			.count();
		if unresolved > 0 {
			warn!("{}: {} rescues have no matching donor account", stage, unresolved);
		}

		let rows = RESCUE_EVENTS.apply(&date_field(rows, PICKUP_START))?;
		ctx.insert(stage, RecordKind::RescueEvent, rows).await?;

		ctx.emit(SyncEvent::StageCompleted { stage }).await
	}

	fn name(&self) -> &'static str {
		"Rescues"
	}
}
