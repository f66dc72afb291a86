//!
//! Session bootstrap for the CRM.
//!
//! A run either reuses a pre-issued bearer token or obtains one with the OAuth2 password
//! grant. The resulting `CrmSession` is created once and handed to the bulk API client.

use super::types::CrmError;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

/// Authenticated connection details shared by every job in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmSession {
	pub instance_url: String,
	pub access_token: String,
	pub api_version: String,
}

impl CrmSession {
	/// Base URL of the bulk API 2.0 job endpoints, with a trailing slash
	pub fn jobs_url(&self) -> String {
		format!(
			"{}/services/data/v{}/jobs/",
			self.instance_url.trim_end_matches('/'),
			self.api_version
		)
	}
}

/// How the run obtains its session
#[derive(Debug, Clone)]
pub enum Credentials {
	/// Token issued out of band
	AccessToken { instance_url: String, token: String },
	/// OAuth2 username/password flow against a connected app
	Password {
		login_url: String,
		client_id: String,
		client_secret: String,
		username: String,
		password: String,
		security_token: String,
	},
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
	instance_url: String,
}

/// Resolve `credentials` into a session.
pub async fn authenticate(
	http_client: &Client,
	credentials: &Credentials,
	api_version: &str,
) -> Result<CrmSession, CrmError> {
	match credentials {
		Credentials::AccessToken {
			instance_url,
			token,
		} => Ok(CrmSession {
			instance_url: instance_url.clone(),
			access_token: token.clone(),
			api_version: api_version.to_string(),
		}),
		Credentials::Password {
			login_url,
			client_id,
			client_secret,
			username,
			password,
			security_token,
		} => {
			let token_url = format!("{}/services/oauth2/token", login_url.trim_end_matches('/'));
			info!("Requesting access token for {}", username);

			let secret = format!("{}{}", password, security_token);
			let form = [
				("grant_type", "password"),
				("client_id", client_id.as_str()),
				("client_secret", client_secret.as_str()),
				("username", username.as_str()),
				("password", secret.as_str()),
			];
			let response = http_client.post(&token_url).form(&form).send().await?;

			let status = response.status();
			if !status.is_success() {
				let body = response.text().await.unwrap_or_default();
				return Err(CrmError::AuthError(format!(
					"Token request failed with HTTP {}: {}",
					status, body
				)));
			}

			let token: TokenResponse = response.json().await?;
			info!("Authenticated against {}", token.instance_url);
			Ok(CrmSession {
				instance_url: token.instance_url,
				access_token: token.access_token,
				api_version: api_version.to_string(),
			})
		}
	}
}
