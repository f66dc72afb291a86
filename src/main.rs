mod config;
mod crm;
mod records;
mod sync;

use clap::Parser;
use tracing::{error, info, warn};

use crate::config::{Cli, Command, ConfigError, DuplicateKind};
use crate::crm::{BulkApiClient, CrmError, authenticate};
use crate::records::codec::render_records;
use crate::records::matcher::Duplicates;
use crate::records::{RecordError, RecordKind};
use crate::sync::{
	BulkJobDriver, FileRecordRepository, MaintenanceTools, SyncError, SyncOrchestrator,
};

#[derive(Debug, thiserror::Error)]
enum AppError {
	#[error("Configuration error: {0}")]
	Config(#[from] ConfigError),

	#[error("{0}")]
	Crm(#[from] CrmError),

	#[error("{0}")]
	Sync(#[from] SyncError),

	#[error("{0}")]
	Record(#[from] RecordError),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	let _ = dotenvy::dotenv();

	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let cli = Cli::parse();
	if let Err(e) = run(cli).await {
		error!("rescue-sync failed: {}", e);
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> Result<(), AppError> {
	let credentials = cli.connection.credentials()?;
	let session = authenticate(
		&reqwest::Client::new(),
		&credentials,
		&cli.connection.api_version,
	)
	.await?;
	let driver = BulkJobDriver::new(
		BulkApiClient::new(&session)?.with_retry_window(cli.sync.retry_window()),
		cli.sync.query_poll(),
		cli.sync.ingest_poll(),
	);
	let repository = FileRecordRepository::new(cli.sync.data_dir.clone());
	let settings = cli.sync.settings();
	let tools = MaintenanceTools::new(&driver, &repository, &settings);

	match cli.command {
		Command::Sync => {
			info!("Starting sync against {}", session.instance_url);
			let stats = SyncOrchestrator::new(&driver, &repository, settings.clone())
				.sync()
				.await?;
			if stats.total_failed() > 0 {
				warn!(
					"{} records were rejected; see the failed results above",
					stats.total_failed()
				);
			}
		}
		Command::Duplicates { kind } => {
			let duplicates = match kind {
				DuplicateKind::Donors => tools.duplicate_accounts(RecordKind::DonorAccount).await?,
				DuplicateKind::Partners => {
					tools.duplicate_accounts(RecordKind::PartnerAccount).await?
				}
				DuplicateKind::Volunteers => tools.duplicate_volunteers().await?,
			};
			match duplicates {
				Duplicates::None => info!("No duplicates found"),
				Duplicates::Found(rows) => print!("{}", render_records(&rows)?),
			}
		}
		Command::IncompleteRescues { today } => {
			let today = today.unwrap_or_else(|| chrono::Local::now().date_naive());
			let overdue = tools.incomplete_rescues(today).await?;
			info!("{} rescues before {} never finished", overdue.len(), today);
			print!("{}", render_records(&overdue)?);
		}
		Command::Discrepancies { direction } => {
			let discrepancies = tools.rescue_discrepancies(direction).await?;
			info!(
				"{} completed rescues only on the {:?} side",
				discrepancies.count(),
				discrepancies.direction
			);
			for rescue_id in &discrepancies.rescue_ids {
				println!("{}", rescue_id);
			}
		}
		Command::UpdateComments => {
			let report = tools.update_rescue_comments().await?;
			info!(
				"Updated comments on {} rescues, {} failed",
				report.processed, report.failed
			);
			if let Some(detail) = &report.failure_detail {
				print!("{}", detail);
			}
		}
	}

	Ok(())
}
