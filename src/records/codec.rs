//! CSV codec for record collections.
//!
//! Both the admin-tool exports and the bulk API payloads are CSV. Parsing trims header cells
//! (the exports carry headers such as `" total_weight "`) and maps empty cells to Null.
//! Rendering writes the union of all columns in first-seen order with LF line endings,
//! which is what ingest jobs are created with.

use super::error::RecordError;
use super::record::{FieldValue, Record};
use indexmap::IndexSet;

const UTF8_BOM: &str = "\u{feff}";

/// Parse CSV text with a header row into records
pub fn parse_records(text: &str) -> Result<Vec<Record>, RecordError> {
	let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
	let mut reader = csv::ReaderBuilder::new()
		.trim(csv::Trim::Headers)
		.from_reader(text.as_bytes());

	let headers = reader.headers()?.clone();
	let mut records = Vec::new();
	for row in reader.records() {
		let row = row?;
		records.push(Record::from_pairs(
			headers
				.iter()
				.zip(row.iter())
				.map(|(header, cell)| (header, FieldValue::from_cell(cell))),
		));
	}

	Ok(records)
}

/// Ordered union of the columns of `records`
pub fn columns_of(records: &[Record]) -> Vec<String> {
	let mut columns = IndexSet::new();
	for record in records {
		for name in record.field_names() {
			if !columns.contains(name) {
				columns.insert(name.to_string());
			}
		}
	}
	columns.into_iter().collect()
}

/// Render records as CSV with a header row. An empty collection renders as an empty string.
pub fn render_records(records: &[Record]) -> Result<String, RecordError> {
	if records.is_empty() {
		return Ok(String::new());
	}

	let columns = columns_of(records);
	let mut writer = csv::WriterBuilder::new()
		.terminator(csv::Terminator::Any(b'\n'))
		.from_writer(Vec::new());

	writer.write_record(&columns)?;
	for record in records {
		writer.write_record(columns.iter().map(|column| record.get(column).to_cell()))?;
	}

	let bytes = writer
		.into_inner()
		.map_err(|e| RecordError::EncodingError(format!("Failed to flush CSV writer: {}", e)))?;
	String::from_utf8(bytes)
		.map_err(|e| RecordError::EncodingError(format!("CSV output is not UTF-8: {}", e)))
}
