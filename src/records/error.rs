/// Errors raised while reading, mapping or matching records
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
	#[error("CSV error: {0}")]
	CsvError(#[from] csv::Error),

	#[error("Encoding error: {0}")]
	EncodingError(String),

	#[error("Column '{column}' is missing from the {table} export")]
	MissingColumn { table: &'static str, column: String },

	#[error("Key '{key}' matches {count} remote records")]
	AmbiguousKey { key: String, count: usize },

	#[error("Parent account '{parent}' of '{name}' was not found after the first upload pass")]
	MissingParent { name: String, parent: String },
}
