//! Parent/child resolution for newly discovered accounts.
//!
//! A child account can only be inserted once its parent exists remotely, so new accounts are
//! uploaded in two passes. The first pass carries self-parented accounts, accounts whose
//! parent is already known remotely, and a minimal stand-in for every parent that exists
//! neither remotely nor among the self-parented accounts of the same batch. The second pass carries the children of those stand-ins and is only built
//! after the first pass has landed and the remote account list has been re-read.

use super::error::RecordError;
use super::matcher::{RemoteIndex, distinct};
use super::record::{FieldValue, Record};
use std::collections::HashSet;
use tracing::{debug, warn};

pub const NAME: &str = "Name";
pub const PARENT_NAME: &str = "Parent Name";
pub const PARENT_ID: &str = "ParentId";
pub const RECORD_TYPE_ID: &str = "RecordTypeId";

/// What to do with a second-pass account whose parent cannot be found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MissingParentPolicy {
	/// Stop the run
	#[default]
	Abort,
	/// Drop the account and keep going
	SkipAndWarn,
}

/// The two upload passes for one account type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchyPlan {
	/// De-duplicated; contains synthesized parents
	pub first_pass: Vec<Record>,
	/// Children of synthesized parents, still without `ParentId`
	pub second_pass: Vec<Record>,
	pub synthesized_parents: usize,
}

fn parent_of(record: &Record) -> Option<String> {
	record.get(PARENT_NAME).key()
}

/// Names of the accounts that are their own parent
fn self_parented(records: &[Record]) -> HashSet<String> {
	records
		.iter()
		.filter_map(|record| {
			let name = record.get(NAME).key()?;
			match parent_of(record) {
				Some(parent) if parent != name => None,
				_ => Some(name),
			}
		})
		.collect()
}

/// Minimal stand-in for a parent that does not exist remotely yet, with the columns of
/// `template` so it fits in the same upload.
fn synthesize_parent(template: &Record, parent_name: &str, record_type_id: &str) -> Record {
	template
		.field_names()
		.fold(Record::new(), |record, name| record.with(name, FieldValue::Null))
		.with(PARENT_NAME, parent_name)
		.with(NAME, parent_name)
		.with(RECORD_TYPE_ID, record_type_id)
}

/// Classify unmatched accounts into the two upload passes.
///
/// `remote_accounts` maps normalized account names of this record type to remote IDs.
/// An account without a parent name is treated as its own parent.
pub fn plan_uploads(
	unmatched: Vec<Record>,
	remote_accounts: &RemoteIndex,
	record_type_id: &str,
) -> Result<HierarchyPlan, RecordError> {
	let in_batch = self_parented(&unmatched);
	let mut synthesized = HashSet::new();
	let mut first_pass = Vec::new();
	let mut second_pass = Vec::new();

	for record in unmatched {
		let record = record
			.with(PARENT_ID, FieldValue::Null)
			.with(RECORD_TYPE_ID, record_type_id);
		let name = record.get(NAME).key();

		let Some(parent_name) = parent_of(&record) else {
			first_pass.push(record);
			continue;
		};

		if name.as_deref() == Some(parent_name.as_str()) {
			first_pass.push(record);
		} else if let Some(parent_id) = remote_accounts.lookup(&parent_name)? {
			let parent_id = parent_id.clone();
			first_pass.push(record.with(PARENT_ID, parent_id));
		} else {
			if !in_batch.contains(&parent_name) && synthesized.insert(parent_name.clone()) {
				first_pass.push(synthesize_parent(&record, &parent_name, record_type_id));
			}
			second_pass.push(record);
		}
	}

	let requested = first_pass.len();
	let first_pass = distinct(first_pass);
	let collapsed = requested - first_pass.len();
	if collapsed > 0 {
		debug!("Collapsed {} duplicate rows in the first upload pass", collapsed);
	}

	Ok(HierarchyPlan {
		first_pass,
		second_pass,
		synthesized_parents: synthesized.len(),
	})
}

/// Second-pass accounts with their parent IDs attached, and the ones that were skipped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParentAttachment {
	pub ready: Vec<Record>,
	pub skipped: Vec<Record>,
}

/// Look up each second-pass account's parent in the refreshed remote account index.
pub fn attach_parent_ids(
	second_pass: Vec<Record>,
	refreshed: &RemoteIndex,
	policy: MissingParentPolicy,
) -> Result<ParentAttachment, RecordError> {
	let mut attachment = ParentAttachment::default();

	for record in second_pass {
		let parent_name = parent_of(&record).unwrap_or_default();
		match refreshed.lookup(&parent_name)? {
			Some(parent_id) => {
				let parent_id = parent_id.clone();
				attachment.ready.push(record.with(PARENT_ID, parent_id));
			}
			None => {
				let name = record.get(NAME).to_cell();
				match policy {
					MissingParentPolicy::Abort => {
						return Err(RecordError::MissingParent {
							name,
							parent: parent_name,
						});
					}
					MissingParentPolicy::SkipAndWarn => {
						warn!(
							"Skipping account '{}': parent '{}' was not found remotely",
							name, parent_name
						);
						attachment.skipped.push(record);
					}
				}
			}
		}
	}

	Ok(attachment)
}

/// Drop the local-only `Parent Name` column before upload
pub fn strip_parent_names(records: Vec<Record>) -> Vec<Record> {
	records
		.into_iter()
		.map(|record| record.without(PARENT_NAME))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::records::matcher::JoinPolicy;

	const DONOR_TYPE: &str = "0123t000000YYv2AAG";

	fn account(name: &str, parent: &str) -> Record {
		Record::from_pairs([
			(PARENT_NAME, parent),
			(NAME, name),
			("ShippingCity", "Pittsburgh"),
		])
	}

	fn index(rows: &[(&str, &str)]) -> RemoteIndex {
		let remote: Vec<Record> = rows
			.iter()
			.map(|(id, name)| Record::from_pairs([("Id", *id), (NAME, *name)]))
			.collect();
		RemoteIndex::build(&remote, NAME, "Id", JoinPolicy::FirstMatch)
	}

	#[test]
	fn test_two_pass_plan_for_new_parent() {
		let plan = plan_uploads(
			vec![account("A", "A"), account("B", "P")],
			&index(&[]),
			DONOR_TYPE,
		)
		.unwrap();

		assert_eq!(plan.first_pass.len(), 2);
		assert_eq!(plan.first_pass[0].text(NAME), Some("A"));
		assert_eq!(plan.first_pass[0].text(PARENT_NAME), Some("A"));
		assert_eq!(plan.first_pass[1].text(NAME), Some("P"));
		assert_eq!(plan.first_pass[1].text(PARENT_NAME), Some("P"));
		assert!(plan.first_pass[1].get("ShippingCity").is_null());
		assert_eq!(plan.first_pass[1].text(RECORD_TYPE_ID), Some(DONOR_TYPE));
		assert_eq!(plan.synthesized_parents, 1);

		assert_eq!(plan.second_pass.len(), 1);
		assert_eq!(plan.second_pass[0].text(NAME), Some("B"));
		assert!(plan.second_pass[0].get(PARENT_ID).is_null());

		let refreshed = index(&[("aid1", "A"), ("pid1", "P")]);
		let attachment =
			attach_parent_ids(plan.second_pass, &refreshed, MissingParentPolicy::Abort).unwrap();
		assert_eq!(attachment.ready.len(), 1);
		assert_eq!(attachment.ready[0].text(PARENT_ID), Some("pid1"));
	}

	#[test]
	fn test_known_parent_goes_to_first_pass_with_id() {
		let plan = plan_uploads(
			vec![account("B", "P")],
			&index(&[("pid9", "P")]),
			DONOR_TYPE,
		)
		.unwrap();
		assert_eq!(plan.first_pass.len(), 1);
		assert_eq!(plan.first_pass[0].text(PARENT_ID), Some("pid9"));
		assert!(plan.second_pass.is_empty());
		assert_eq!(plan.synthesized_parents, 0);
	}

	#[test]
	fn test_shared_new_parent_is_synthesized_once() {
		let plan = plan_uploads(
			vec![account("B", "P"), account("C", "P")],
			&index(&[]),
			DONOR_TYPE,
		)
		.unwrap();
		assert_eq!(plan.first_pass.len(), 1);
		assert_eq!(plan.second_pass.len(), 2);
		assert_eq!(plan.synthesized_parents, 1);
	}

	#[test]
	fn test_parent_in_same_batch_is_not_synthesized() {
		let plan = plan_uploads(
			vec![account("P", "P"), account("B", "P")],
			&index(&[]),
			DONOR_TYPE,
		)
		.unwrap();
		assert_eq!(plan.first_pass.len(), 1);
		assert_eq!(plan.first_pass[0].text("ShippingCity"), Some("Pittsburgh"));
		assert_eq!(plan.second_pass.len(), 1);
		assert_eq!(plan.second_pass[0].text(NAME), Some("B"));
		assert_eq!(plan.synthesized_parents, 0);
	}

	#[test]
	fn test_missing_parent_aborts_by_default() {
		let result = attach_parent_ids(
			vec![account("B", "P")],
			&index(&[]),
			MissingParentPolicy::Abort,
		);
		assert!(matches!(
			result,
			Err(RecordError::MissingParent { parent, .. }) if parent == "P"
		));
	}

	#[test]
	fn test_missing_parent_can_be_skipped() {
		let attachment = attach_parent_ids(
			vec![account("B", "P"), account("C", "Q")],
			&index(&[("qid", "Q")]),
			MissingParentPolicy::SkipAndWarn,
		)
		.unwrap();
		assert_eq!(attachment.ready.len(), 1);
		assert_eq!(attachment.skipped.len(), 1);
		assert_eq!(attachment.skipped[0].text(NAME), Some("B"));
	}

	#[test]
	fn test_strip_parent_names() {
		let stripped = strip_parent_names(vec![account("A", "A")]);
		assert!(!stripped[0].contains(PARENT_NAME));
		assert_eq!(stripped[0].text(NAME), Some("A"));
	}
}
