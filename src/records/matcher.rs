//! Set-difference joins and key lookups between local and remote record collections.
//!
//! Keys are compared through `FieldValue::key`, so an integer weight of `120` on one side
//! matches the text `"120"` on the other. Null key components never match anything.

use super::error::RecordError;
use super::record::{FieldValue, Record};
use itertools::Itertools;
use std::collections::HashMap;

/// How duplicate keys on the remote side are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum JoinPolicy {
	/// Tolerate duplicates; lookups resolve to the first remote row
	#[default]
	FirstMatch,
	/// A local row that hits a duplicated remote key is an error
	StrictUnique,
}

/// Join key made of one or more fields, possibly named differently on each side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchKey {
	local: Vec<String>,
	remote: Vec<String>,
}

impl MatchKey {
	/// Same field name on both sides
	pub fn field(name: &str) -> Self {
		Self {
			local: vec![name.to_string()],
			remote: vec![name.to_string()],
		}
	}

	/// Composite key given as `(local, remote)` field pairs
	pub fn pairs(pairs: &[(&str, &str)]) -> Self {
		Self {
			local: pairs.iter().map(|(local, _)| local.to_string()).collect(),
			remote: pairs.iter().map(|(_, remote)| remote.to_string()).collect(),
		}
	}

	fn extract(fields: &[String], record: &Record) -> Option<Vec<String>> {
		fields.iter().map(|field| record.get(field).key()).collect()
	}

	fn local_key(&self, record: &Record) -> Option<Vec<String>> {
		Self::extract(&self.local, record)
	}

	fn remote_key(&self, record: &Record) -> Option<Vec<String>> {
		Self::extract(&self.remote, record)
	}
}

/// Local records whose key has no counterpart in `remote`, in input order.
///
/// Each local row is returned at most once no matter how many remote rows share its key.
pub fn find_unmatched(
	local: Vec<Record>,
	remote: &[Record],
	key: &MatchKey,
	policy: JoinPolicy,
) -> Result<Vec<Record>, RecordError> {
	let remote_counts = remote
		.iter()
		.filter_map(|record| key.remote_key(record))
		.counts();

	let mut unmatched = Vec::new();
	for record in local {
		match key.local_key(&record) {
			Some(local_key) => match remote_counts.get(&local_key) {
				None => unmatched.push(record),
				Some(&count) if count > 1 && policy == JoinPolicy::StrictUnique => {
					return Err(RecordError::AmbiguousKey {
						key: local_key.join(" / "),
						count,
					});
				}
				Some(_) => {}
			},
			None => unmatched.push(record),
		}
	}

	Ok(unmatched)
}

/// Result of a duplicate search
#[derive(Debug, Clone, PartialEq)]
pub enum Duplicates {
	None,
	Found(Vec<Record>),
}

impl Duplicates {
	pub fn rows(&self) -> &[Record] {
		match self {
			Duplicates::None => &[],
			Duplicates::Found(rows) => rows,
		}
	}
}

/// Union of every group of records sharing the same `field` value, when the group has more
/// than one row. Groups come out in key order, rows keep their input order within a group.
/// Records with a Null key are ignored.
pub fn find_duplicates(records: &[Record], field: &str) -> Duplicates {
	let keyed = records
		.iter()
		.filter_map(|record| record.get(field).key().map(|key| (key, record)))
		.sorted_by(|(a, _), (b, _)| a.cmp(b));

	let mut duplicates = Vec::new();
	for (_, group) in &keyed.group_by(|(key, _)| key.clone()) {
		let group: Vec<&Record> = group.map(|(_, record)| record).collect();
		if group.len() > 1 {
			duplicates.extend(group.into_iter().cloned());
		}
	}

	if duplicates.is_empty() {
		Duplicates::None
	} else {
		Duplicates::Found(duplicates)
	}
}

/// Drop rows equal to an earlier row, keeping the first occurrence
pub fn distinct(records: Vec<Record>) -> Vec<Record> {
	let mut unique: Vec<Record> = Vec::with_capacity(records.len());
	for record in records {
		if !unique.contains(&record) {
			unique.push(record);
		}
	}
	unique
}

/// Lookup table from a remote key field to a remote value field (usually `Name` to `Id`)
#[derive(Debug, Clone, Default)]
pub struct RemoteIndex {
	entries: HashMap<String, Vec<FieldValue>>,
	policy: JoinPolicy,
}

impl RemoteIndex {
	pub fn build(remote: &[Record], key_field: &str, value_field: &str, policy: JoinPolicy) -> Self {
		let mut entries: HashMap<String, Vec<FieldValue>> = HashMap::new();
		for record in remote {
			if let Some(key) = record.get(key_field).key() {
				entries
					.entry(key)
					.or_default()
					.push(record.get(value_field).clone());
			}
		}
		Self { entries, policy }
	}

	/// Value for `key`, or `None` on a miss
	pub fn lookup(&self, key: &str) -> Result<Option<&FieldValue>, RecordError> {
		match self.entries.get(key).map(Vec::as_slice) {
			None | Some([]) => Ok(None),
			Some([first]) => Ok(Some(first)),
			Some(values) => match self.policy {
				JoinPolicy::FirstMatch => Ok(values.first()),
				JoinPolicy::StrictUnique => Err(RecordError::AmbiguousKey {
					key: key.to_string(),
					count: values.len(),
				}),
			},
		}
	}
}

/// Left join: set `target_field` on every local record to the value looked up by
/// `local_key_field`, or Null when there is no match.
pub fn lookup_join(
	local: Vec<Record>,
	index: &RemoteIndex,
	local_key_field: &str,
	target_field: &str,
) -> Result<Vec<Record>, RecordError> {
	local
		.into_iter()
		.map(|record| -> Result<Record, RecordError> {
			let value = match record.get(local_key_field).key() {
				Some(key) => index.lookup(&key)?.cloned().unwrap_or_default(),
				None => FieldValue::Null,
			};
			Ok(record.with(target_field, value))
		})
		.collect()
}
