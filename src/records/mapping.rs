//! Named-field mapping tables between admin-tool exports and remote object fields.
//!
//! Every local export goes through one of these tables before it is matched or uploaded. A
//! table is validated against the records it is applied to, so a renamed or missing export
//! column stops the run at the mapping boundary instead of shifting data into the wrong field.

use super::error::RecordError;
use super::record::{FieldValue, Record};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Explicit `source -> target` column mapping for one record type
#[derive(Debug, Clone, Copy)]
pub struct MappingTable {
	pub name: &'static str,
	/// `(source, target)` pairs, in output column order
	pub fields: &'static [(&'static str, &'static str)],
	/// Target columns the export does not carry; filled with Null
	pub defaults: &'static [&'static str],
}

impl MappingTable {
	/// Fail with `MissingColumn` when any source column is absent from a record
	pub fn validate(&self, records: &[Record]) -> Result<(), RecordError> {
		for record in records {
			if let Some((source, _)) = self
				.fields
				.iter()
				.find(|(source, _)| !record.contains(source))
			{
				return Err(RecordError::MissingColumn {
					table: self.name,
					column: source.to_string(),
				});
			}
		}
		Ok(())
	}

	/// Validate and project `records` onto the target columns
	pub fn apply(&self, records: &[Record]) -> Result<Vec<Record>, RecordError> {
		self.validate(records)?;

		Ok(records
			.iter()
			.map(|record| {
				let mapped = Record::from_pairs(
					self.fields
						.iter()
						.map(|(source, target)| (*target, record.get(source).clone())),
				);
				self.defaults
					.iter()
					.fold(mapped, |mapped, target| mapped.with(*target, FieldValue::Null))
			})
			.collect())
	}
}

pub const DONOR_ACCOUNTS: MappingTable = MappingTable {
	name: "donors",
	fields: &[
		("Name", "Parent Name"),
		("location_name", "Name"),
		("line1", "ShippingStreet"),
		("city", "ShippingCity"),
		("state", "ShippingState"),
		("zip", "ShippingPostalCode"),
		("county", "County__c"),
	],
	defaults: &[],
};

/// Partner exports carry no county
pub const PARTNER_ACCOUNTS: MappingTable = MappingTable {
	name: "partners",
	fields: &[
		("Name", "Parent Name"),
		("location_name", "Name"),
		("line1", "ShippingStreet"),
		("city", "ShippingCity"),
		("state", "ShippingState"),
		("zip", "ShippingPostalCode"),
	],
	defaults: &["County__c"],
};

pub const VOLUNTEER_CONTACTS: MappingTable = MappingTable {
	name: "volunteers",
	fields: &[
		("user_id", "Volunteer_Id__c"),
		("first_name", "FirstName"),
		("last_name", "LastName"),
		("email", "Email"),
		("phone", "Phone"),
		("address", "MailingStreet"),
		("city", "MailingCity"),
		("state", "MailingState"),
		("zip", "MailingPostalCode"),
		("county", "County__c"),
	],
	defaults: &[],
};

/// Contact columns sent on insert. The admin-tool user ID stays local.
pub const VOLUNTEER_UPLOAD_COLUMNS: &[&str] = &[
	"FirstName",
	"LastName",
	"Email",
	"Phone",
	"MailingStreet",
	"MailingCity",
	"MailingState",
	"MailingPostalCode",
	"County__c",
	"npsp__Primary_Affiliation__c",
];

/// Applied after the donor, partner and volunteer IDs have been looked up
pub const RESCUE_EVENTS: MappingTable = MappingTable {
	name: "rescues",
	fields: &[
		("rescue_detail_url", "Rescue_Detail_URL__c"),
		("rescue_id", "Rescue_Id__c"),
		("pickup_start", "Day_of_Pickup__c"),
		("food_type", "Food_Type__c"),
		("description", "Description__c"),
		("rescue_type", "Type__c"),
		("rescue_state", "State__c"),
		("county", "County__c"),
		("total_weight", "Weight__c"),
		("Food_Donor_Account_Name__c", "Food_Donor_Account_Name__c"),
		("Agency_Name__c", "Agency_Name__c"),
		("Volunteer_Name__c", "Volunteer_Name__c"),
	],
	defaults: &[],
};

pub const RESCUE_COMMENTS: MappingTable = MappingTable {
	name: "rescue comments",
	fields: &[("Rescue ID", "Rescue ID"), ("Comments", "Comments")],
	defaults: &[],
};

/// Split `records` into those whose `field` is an integer (rewritten as `Integer`) and a
/// count of the rows that were dropped.
pub fn retain_integer(records: Vec<Record>, field: &str) -> (Vec<Record>, usize) {
	let total = records.len();
	let kept: Vec<Record> = records
		.into_iter()
		.filter_map(|record| {
			let value = record.get(field).as_integer()?;
			Some(record.with(field, value))
		})
		.collect();
	let dropped = total - kept.len();
	(kept, dropped)
}

/// Rewrite every value of `field` that has an integer view as `Integer`. Other values are kept.
pub fn coerce_integer(records: Vec<Record>, field: &str) -> Vec<Record> {
	records
		.into_iter()
		.map(|record| match record.get(field).as_integer() {
			Some(value) => record.with(field, value),
			None => record,
		})
		.collect()
}

/// Drop a spurious decimal part such as `"15213.0"` from numeric codes. Text without a
/// decimal point is left alone so leading zeros survive.
pub fn trim_decimal_zero(records: Vec<Record>, field: &str) -> Vec<Record> {
	records
		.into_iter()
		.map(|record| {
			let value = record.get(field);
			match value.as_str().filter(|text| text.contains('.')) {
				Some(_) => match value.as_integer() {
					Some(integer) => record.with(field, integer.to_string()),
					None => record,
				},
				None => record,
			}
		})
		.collect()
}

/// Fail with `MissingColumn` unless every record carries all of `columns`
pub fn require_columns(
	table: &'static str,
	records: &[Record],
	columns: &[&str],
) -> Result<(), RecordError> {
	for record in records {
		if let Some(column) = columns.iter().find(|column| !record.contains(column)) {
			return Err(RecordError::MissingColumn {
				table,
				column: column.to_string(),
			});
		}
	}
	Ok(())
}

const DATETIME_FORMATS: &[&str] = &[
	"%Y-%m-%d %H:%M:%S",
	"%Y-%m-%d %H:%M",
	"%Y-%m-%dT%H:%M:%S",
	"%m/%d/%Y %H:%M:%S",
	"%m/%d/%Y %H:%M",
	"%m/%d/%Y %I:%M %p",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"];

/// Parse the date part of an admin-tool timestamp
pub fn parse_date(value: &str) -> Option<NaiveDate> {
	let value = value.trim();
	if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
		return Some(parsed.date_naive());
	}
	DATETIME_FORMATS
		.iter()
		.find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
		.map(|parsed| parsed.date())
		.or_else(|| {
			DATE_FORMATS
				.iter()
				.find_map(|format| NaiveDate::parse_from_str(value, format).ok())
		})
}

/// Rewrite `field` as a `Date`. Values that cannot be parsed become Null.
pub fn date_field(records: Vec<Record>, field: &str) -> Vec<Record> {
	records
		.into_iter()
		.map(|record| {
			let value = match record.get(field) {
				FieldValue::Text(text) => parse_date(text).map(FieldValue::Date).unwrap_or_default(),
				FieldValue::Date(date) => FieldValue::Date(*date),
				_ => FieldValue::Null,
			};
			record.with(field, value)
		})
		.collect()
}
