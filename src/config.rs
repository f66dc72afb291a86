//! Command-line and environment configuration.
//!
//! Every option can be given as a flag or through the environment; a `.env` file in the
//! working directory is loaded first.

use crate::crm::Credentials;
use crate::records::hierarchy::MissingParentPolicy;
use crate::records::matcher::JoinPolicy;
use crate::sync::{DiscrepancyDirection, PollSettings, SyncSettings};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Missing setting: {0}")]
	MissingSetting(&'static str),
}

#[derive(Parser, Debug)]
#[command(name = "rescue-sync")]
#[command(about = "Reconcile food rescue admin exports with the CRM")]
#[command(version)]
pub struct Cli {
	#[command(flatten)]
	pub connection: ConnectionArgs,

	#[command(flatten)]
	pub sync: SyncArgs,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
	/// Upload new donors, partners, volunteers and rescues
	Sync,
	/// List remote records that share a name
	Duplicates {
		#[arg(value_enum)]
		kind: DuplicateKind,
	},
	/// List local rescues past their pickup date that never finished
	IncompleteRescues {
		/// Cut-off date, defaults to today
		#[arg(long)]
		today: Option<NaiveDate>,
	},
	/// List completed rescues known to only one side
	Discrepancies {
		#[arg(value_enum)]
		direction: DiscrepancyDirection,
	},
	/// Fill empty remote rescue comments from the comments export
	UpdateComments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DuplicateKind {
	Donors,
	Partners,
	Volunteers,
}

/// How to reach the CRM
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
	/// Instance URL, used together with an access token
	#[arg(long, env = "SF_INSTANCE_URL", global = true)]
	pub instance_url: Option<String>,

	/// Pre-issued access token; skips the password login
	#[arg(long, env = "SF_ACCESS_TOKEN", hide_env_values = true, global = true)]
	pub access_token: Option<String>,

	#[arg(
		long,
		env = "SF_LOGIN_URL",
		default_value = "https://login.salesforce.com",
		global = true
	)]
	pub login_url: String,

	#[arg(long, env = "SF_CLIENT_ID", global = true)]
	pub client_id: Option<String>,

	#[arg(long, env = "SF_CLIENT_SECRET", hide_env_values = true, global = true)]
	pub client_secret: Option<String>,

	#[arg(long, env = "SF_USERNAME", global = true)]
	pub username: Option<String>,

	#[arg(long, env = "SF_PASSWORD", hide_env_values = true, global = true)]
	pub password: Option<String>,

	#[arg(
		long,
		env = "SF_SECURITY_TOKEN",
		default_value = "",
		hide_env_values = true,
		global = true
	)]
	pub security_token: String,

	#[arg(long, env = "SF_API_VERSION", default_value = "58.0", global = true)]
	pub api_version: String,
}

impl ConnectionArgs {
	/// Prefer a pre-issued token; otherwise every password-flow setting is required
	pub fn credentials(&self) -> Result<Credentials, ConfigError> {
		if let Some(token) = &self.access_token {
			let instance_url = self
				.instance_url
				.clone()
				.ok_or(ConfigError::MissingSetting("SF_INSTANCE_URL"))?;
			return Ok(Credentials::AccessToken {
				instance_url,
				token: token.clone(),
			});
		}

		let required = |value: &Option<String>, name: &'static str| {
			value.clone().ok_or(ConfigError::MissingSetting(name))
		};
		Ok(Credentials::Password {
			login_url: self.login_url.clone(),
			client_id: required(&self.client_id, "SF_CLIENT_ID")?,
			client_secret: required(&self.client_secret, "SF_CLIENT_SECRET")?,
			username: required(&self.username, "SF_USERNAME")?,
			password: required(&self.password, "SF_PASSWORD")?,
			security_token: self.security_token.clone(),
		})
	}
}

/// Where the exports live and how records are matched and polled
#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
	/// Directory holding the lastmile_*.csv exports
	#[arg(long, env = "RESCUE_SYNC_DATA_DIR", default_value = ".", global = true)]
	pub data_dir: PathBuf,

	#[arg(
		long,
		env = "RESCUE_SYNC_DONOR_RECORD_TYPE",
		default_value = "0123t000000YYv2AAG",
		global = true
	)]
	pub donor_record_type: String,

	#[arg(
		long,
		env = "RESCUE_SYNC_PARTNER_RECORD_TYPE",
		default_value = "0123t000000YYv3AAG",
		global = true
	)]
	pub partner_record_type: String,

	#[arg(
		long,
		env = "RESCUE_SYNC_VOLUNTEER_AFFILIATION",
		default_value = "0013t00001teMBwAAM",
		global = true
	)]
	pub volunteer_affiliation: String,

	#[arg(long, env = "RESCUE_SYNC_JOIN_POLICY", value_enum, default_value_t = JoinPolicy::FirstMatch, global = true)]
	pub join_policy: JoinPolicy,

	#[arg(long, env = "RESCUE_SYNC_MISSING_PARENT", value_enum, default_value_t = MissingParentPolicy::Abort, global = true)]
	pub missing_parent: MissingParentPolicy,

	#[arg(long, env = "RESCUE_SYNC_QUERY_POLL_MS", default_value_t = 500, global = true)]
	pub query_poll_ms: u64,

	#[arg(long, env = "RESCUE_SYNC_INGEST_POLL_MS", default_value_t = 250, global = true)]
	pub ingest_poll_ms: u64,

	/// Give up on a job after this many status checks
	#[arg(long, env = "RESCUE_SYNC_MAX_POLL_ATTEMPTS", global = true)]
	pub max_poll_attempts: Option<u32>,

	/// How long a status or result read keeps retrying transient errors
	#[arg(long, env = "RESCUE_SYNC_RETRY_WINDOW_SECS", default_value_t = 60, global = true)]
	pub retry_window_secs: u64,
}

impl SyncArgs {
	pub fn settings(&self) -> SyncSettings {
		SyncSettings {
			donor_record_type: self.donor_record_type.clone(),
			partner_record_type: self.partner_record_type.clone(),
			volunteer_affiliation: self.volunteer_affiliation.clone(),
			join_policy: self.join_policy,
			missing_parent: self.missing_parent,
		}
	}

	pub fn query_poll(&self) -> PollSettings {
		PollSettings::new(Duration::from_millis(self.query_poll_ms), self.max_poll_attempts)
	}

	pub fn ingest_poll(&self) -> PollSettings {
		PollSettings::new(Duration::from_millis(self.ingest_poll_ms), self.max_poll_attempts)
	}

	pub fn retry_window(&self) -> Duration {
		Duration::from_secs(self.retry_window_secs)
	}
}
