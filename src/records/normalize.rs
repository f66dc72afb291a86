//! Whitespace normalization for free-text join keys.

use super::record::{FieldValue, Record};
use itertools::Itertools;

/// Collapse every whitespace run to a single space and trim both ends.
pub fn normalize_text(value: &str) -> String {
	value.split_whitespace().join(" ")
}

/// Normalize a single value. Non-text values are stringified first; Null stays Null.
pub fn normalize_value(value: &FieldValue) -> FieldValue {
	match value {
		FieldValue::Null => FieldValue::Null,
		FieldValue::Text(text) => FieldValue::Text(normalize_text(text)),
		other => FieldValue::Text(normalize_text(&other.to_cell())),
	}
}

/// Return a new collection in which `field` is normalized on every record.
///
/// Records without the field are passed through untouched.
pub fn normalize_field(records: Vec<Record>, field: &str) -> Vec<Record> {
	records
		.into_iter()
		.map(|record| {
			if record.contains(field) {
				let value = normalize_value(record.get(field));
				record.with(field, value)
			} else {
				record
			}
		})
		.collect()
}

pub fn normalize_fields(records: Vec<Record>, fields: &[&str]) -> Vec<Record> {
	fields
		.iter()
		.fold(records, |records, field| normalize_field(records, field))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_collapses_internal_whitespace() {
		assert_eq!(normalize_text("  Giant  Eagle \t Market\n"), "Giant Eagle Market");
		assert_eq!(normalize_text(""), "");
	}

	#[test]
	fn test_normalization_is_a_fixed_point() {
		let records = vec![
			Record::from_pairs([("Name", "A   B")]),
			Record::from_pairs([("Name", " C\tD ")]),
			Record::new().with("Name", 42i64),
			Record::new().with("Name", FieldValue::Null),
		];
		let once = normalize_field(records, "Name");
		let twice = normalize_field(once.clone(), "Name");
		assert_eq!(once, twice);
		assert_eq!(once[0].text("Name"), Some("A B"));
		assert_eq!(once[1].text("Name"), Some("C D"));
		assert_eq!(once[2].text("Name"), Some("42"));
		assert!(once[3].get("Name").is_null());
	}

	#[test]
	fn test_other_fields_are_untouched() {
		let records = vec![Record::from_pairs([("Name", "A  B"), ("Parent Name", "P  Q")])];
		let normalized = normalize_field(records, "Name");
		assert_eq!(normalized[0].text("Parent Name"), Some("P  Q"));

		let normalized = normalize_fields(normalized, &["Parent Name", "Missing"]);
		assert_eq!(normalized[0].text("Parent Name"), Some("P Q"));
		assert!(!normalized[0].contains("Missing"));
	}
}
