use crate::records::Record;
use crate::records::codec::parse_records;
use crate::sync::types::SyncError;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

/// Admin-tool exports the sync reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalSource {
	Donors,
	Partners,
	Volunteers,
	Rescues,
	RescueComments,
}

impl LocalSource {
	pub fn file_name(&self) -> &'static str {
		match self {
			LocalSource::Donors => "lastmile_donors.csv",
			LocalSource::Partners => "lastmile_partners.csv",
			LocalSource::Volunteers => "lastmile_volunteers.csv",
			LocalSource::Rescues => "lastmile_rescues.csv",
			LocalSource::RescueComments => "lastmile_rescue_comments.csv",
		}
	}
}

impl fmt::Display for LocalSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.file_name())
	}
}

/// Repository for the local side of the reconciliation
#[async_trait::async_trait]
pub trait LocalRecordRepository: Send + Sync {
	async fn load(&self, source: LocalSource) -> Result<Vec<Record>, SyncError>;
}

/// Reads exports from CSV files in one data directory
pub struct FileRecordRepository {
	data_dir: PathBuf,
}

impl FileRecordRepository {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn path_for(&self, source: LocalSource) -> PathBuf {
		self.data_dir.join(source.file_name())
	}
}

#[async_trait::async_trait]
impl LocalRecordRepository for FileRecordRepository {
	async fn load(&self, source: LocalSource) -> Result<Vec<Record>, SyncError> {
		let path = self.path_for(source);
		let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
			SyncError::LocalDataError(format!("Failed to read {}: {}", path.display(), e))
		})?;

		let records = parse_records(&text)?;
		info!("Loaded {} records from {:?}", records.len(), path);
		Ok(records)
	}
}
