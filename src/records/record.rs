//! Core record types shared by the matcher, the hierarchy resolver and the bulk job driver.
//!
//! A `Record` is an ordered mapping of field name to `FieldValue`. Records are treated as
//! values: every transform in this crate consumes or borrows records and returns new ones,
//! so a working copy is never edited behind the caller's back.

use chrono::NaiveDate;
use indexmap::IndexMap;
use std::fmt;

static NULL: FieldValue = FieldValue::Null;

/// A single scalar cell value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldValue {
	#[default]
	Null,
	Text(String),
	Integer(i64),
	Date(NaiveDate),
}

impl FieldValue {
	pub fn text(value: impl Into<String>) -> Self {
		FieldValue::Text(value.into())
	}

	/// Build a value from a raw CSV cell. Empty cells are Null.
	pub fn from_cell(cell: &str) -> Self {
		if cell.is_empty() {
			FieldValue::Null
		} else {
			FieldValue::Text(cell.to_string())
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, FieldValue::Null)
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			FieldValue::Text(text) => Some(text),
			_ => None,
		}
	}

	/// Integer view of the value. Text such as `"120"` or `"120.0"` is accepted.
	pub fn as_integer(&self) -> Option<i64> {
		match self {
			FieldValue::Integer(value) => Some(*value),
			FieldValue::Text(text) => {
				let trimmed = text.trim();
				if let Ok(value) = trimmed.parse::<i64>() {
					return Some(value);
				}
				let float = trimmed.parse::<f64>().ok()?;
				if float.is_finite() && float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
					Some(float as i64)
				} else {
					None
				}
			}
			_ => None,
		}
	}

	pub fn as_date(&self) -> Option<NaiveDate> {
		match self {
			FieldValue::Date(date) => Some(*date),
			_ => None,
		}
	}

	/// Canonical string used when comparing keys across systems. Null has no key.
	pub fn key(&self) -> Option<String> {
		match self {
			FieldValue::Null => None,
			other => Some(other.to_cell()),
		}
	}

	/// Render the value as a CSV cell
	pub fn to_cell(&self) -> String {
		match self {
			FieldValue::Null => String::new(),
			FieldValue::Text(text) => text.clone(),
			FieldValue::Integer(value) => value.to_string(),
			FieldValue::Date(date) => date.format("%Y-%m-%d").to_string(),
		}
	}
}

impl fmt::Display for FieldValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_cell())
	}
}

impl From<&str> for FieldValue {
	fn from(value: &str) -> Self {
		FieldValue::Text(value.to_string())
	}
}

impl From<String> for FieldValue {
	fn from(value: String) -> Self {
		FieldValue::Text(value)
	}
}

impl From<i64> for FieldValue {
	fn from(value: i64) -> Self {
		FieldValue::Integer(value)
	}
}

impl From<NaiveDate> for FieldValue {
	fn from(value: NaiveDate) -> Self {
		FieldValue::Date(value)
	}
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
	fn from(value: Option<T>) -> Self {
		value.map(Into::into).unwrap_or(FieldValue::Null)
	}
}

/// One row from either system
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
	fields: IndexMap<String, FieldValue>,
}

impl Record {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_pairs<I, K, V>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<FieldValue>,
	{
		Self {
			fields: pairs
				.into_iter()
				.map(|(name, value)| (name.into(), value.into()))
				.collect(),
		}
	}

	/// Value of `field`, or Null when the field is absent.
	pub fn get(&self, field: &str) -> &FieldValue {
		self.fields.get(field).unwrap_or(&NULL)
	}

	pub fn text(&self, field: &str) -> Option<&str> {
		self.get(field).as_str()
	}

	pub fn contains(&self, field: &str) -> bool {
		self.fields.contains_key(field)
	}

	/// Returns the record with `field` set. Existing fields keep their position.
	pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
		self.fields.insert(field.into(), value.into());
		self
	}

	pub fn without(mut self, field: &str) -> Self {
		self.fields.shift_remove(field);
		self
	}

	/// Project the record onto `fields`, in that order. Missing fields become Null.
	pub fn select(&self, fields: &[&str]) -> Record {
		Record {
			fields: fields
				.iter()
				.map(|name| (name.to_string(), self.get(name).clone()))
				.collect(),
		}
	}

	pub fn field_names(&self) -> impl Iterator<Item = &str> {
		self.fields.keys().map(String::as_str)
	}
}

/// Record-type discriminant. Determines the remote object a batch is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
	DonorAccount,
	PartnerAccount,
	VolunteerContact,
	RescueEvent,
	RescueComment,
}

impl RecordKind {
	/// Remote object name for this kind
	pub fn sobject(&self) -> &'static str {
		match self {
			RecordKind::DonorAccount | RecordKind::PartnerAccount => "Account",
			RecordKind::VolunteerContact => "Contact",
			RecordKind::RescueEvent | RecordKind::RescueComment => "Food_Rescue__c",
		}
	}

	pub fn label(&self) -> &'static str {
		match self {
			RecordKind::DonorAccount => "Food Donor",
			RecordKind::PartnerAccount => "Nonprofit Partner",
			RecordKind::VolunteerContact => "Volunteer",
			RecordKind::RescueEvent => "Food Rescue",
			RecordKind::RescueComment => "Rescue Comment",
		}
	}
}

impl fmt::Display for RecordKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

/// A homogeneous batch of records ready to be written to the remote store
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
	pub kind: RecordKind,
	pub rows: Vec<Record>,
}

impl RecordBatch {
	pub fn new(kind: RecordKind, rows: Vec<Record>) -> Self {
		Self { kind, rows }
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}
}
