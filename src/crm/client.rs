//!
//! HTTP client for the CRM bulk API 2.0.
//!
//! Query and ingest jobs are exchanged as JSON control messages; job data and query results
//! travel as CSV. Idempotent reads (job status, result pages, failed-record detail) retry
//! transient transport errors with exponential backoff. Job creation and data upload are
//! sent exactly once and surface any rejection to the caller.

use super::auth::CrmSession;
use super::types::*;
use async_trait::async_trait;
use backoff::{ExponentialBackoff, future::retry};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOCATOR_HEADER: &str = "Sforce-Locator";

/// The job-oriented remote interface the driver is written against
#[async_trait]
pub trait BulkApi: Send + Sync {
	async fn create_query_job(&self, query: &str) -> Result<JobInfo, CrmError>;

	async fn query_job_status(&self, job_id: &str) -> Result<JobInfo, CrmError>;

	/// Fetch one page of results; `locator` is `None` for the first page
	async fn query_results(
		&self,
		job_id: &str,
		locator: Option<&str>,
	) -> Result<ResultPage, CrmError>;

	async fn create_ingest_job(
		&self,
		operation: BulkOperation,
		object: &str,
	) -> Result<JobInfo, CrmError>;

	/// Attach the CSV payload to an open ingest job
	async fn upload_job_data(&self, job_id: &str, csv: String) -> Result<(), CrmError>;

	/// Signal `UploadComplete` so the remote side starts processing
	async fn close_ingest_job(&self, job_id: &str) -> Result<JobInfo, CrmError>;

	async fn ingest_job_status(&self, job_id: &str) -> Result<JobInfo, CrmError>;

	/// CSV describing every record that failed in the job
	async fn failed_results(&self, job_id: &str) -> Result<String, CrmError>;
}

/// Bulk API client bound to one authenticated session
#[derive(Clone)]
pub struct BulkApiClient {
	/// The underlying HTTP client, carrying the bearer token.
	http_client: Client,
	/// Base URL of the job endpoints, with a trailing slash.
	jobs_url: String,
	/// Upper bound on the time spent retrying one idempotent read.
	retry_window: Duration,
}

impl BulkApiClient {
	/// Create a new client for `session`.
	///
	/// # Errors
	/// Returns `CrmError` if the token is not a valid header value or the HTTP client
	/// cannot be built.
	pub fn new(session: &CrmSession) -> Result<Self, CrmError> {
		let mut headers = HeaderMap::new();
		let bearer = HeaderValue::from_str(&format!("Bearer {}", session.access_token))
			.map_err(|e| CrmError::AuthError(format!("Invalid access token: {}", e)))?;
		headers.insert(AUTHORIZATION, bearer);

		let http_client = Client::builder()
			.default_headers(headers)
			.timeout(Duration::from_secs(120))
			.build()?;

		Ok(Self {
			http_client,
			jobs_url: session.jobs_url(),
			retry_window: Duration::from_secs(60),
		})
	}

	/// Override how long transient read failures are retried.
	pub fn with_retry_window(mut self, retry_window: Duration) -> Self {
		self.retry_window = retry_window;
		self
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.jobs_url, path)
	}

	/// Turn a non-success response into `CrmError::ApiError`
	async fn check(response: Response) -> Result<Response, CrmError> {
		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}
		let body = response.text().await.unwrap_or_default();
		Err(CrmError::ApiError {
			status: status.as_u16(),
			body,
		})
	}

	/// Decode a JSON control message
	async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, CrmError> {
		let body = response.text().await?;
		Ok(serde_json::from_str(&body)?)
	}

	/// GET with retry on connection errors, 5xx and 429.
	async fn get_with_retry(
		&self,
		url: &str,
		locator: Option<&str>,
	) -> Result<Response, CrmError> {
		let policy = ExponentialBackoff {
			max_elapsed_time: Some(self.retry_window),
			..ExponentialBackoff::default()
		};

		retry(policy, move || async move {
			let mut request = self.http_client.get(url);
			if let Some(locator) = locator {
				request = request.query(&[("locator", locator)]);
			}

			let response = request.send().await.map_err(|e| {
				warn!("Request to {} failed: {}", url, e);
				backoff::Error::transient(CrmError::from(e))
			})?;

			let status = response.status();
			if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
				let body = response.text().await.unwrap_or_default();
				warn!("Transient HTTP {} from {}: {}", status, url, body);
				return Err(backoff::Error::transient(CrmError::ApiError {
					status: status.as_u16(),
					body,
				}));
			}

			Self::check(response).await.map_err(backoff::Error::permanent)
		})
		.await
	}
}

#[async_trait]
impl BulkApi for BulkApiClient {
	async fn create_query_job(&self, query: &str) -> Result<JobInfo, CrmError> {
		debug!("Creating query job: {}", query);
		let body = CreateQueryJobRequest {
			operation: BulkOperation::Query,
			query,
		};

		let response = self
			.http_client
			.post(self.url("query"))
			.json(&body)
			.send()
			.await?;
		let info: JobInfo = Self::read_json(Self::check(response).await?).await?;

		info!("Query job {} created", info.id);
		Ok(info)
	}

	async fn query_job_status(&self, job_id: &str) -> Result<JobInfo, CrmError> {
		let response = self
			.get_with_retry(&self.url(&format!("query/{}", job_id)), None)
			.await?;
		Self::read_json(response).await
	}

	async fn query_results(
		&self,
		job_id: &str,
		locator: Option<&str>,
	) -> Result<ResultPage, CrmError> {
		let response = self
			.get_with_retry(&self.url(&format!("query/{}/results", job_id)), locator)
			.await?;

		let next_locator = response
			.headers()
			.get(LOCATOR_HEADER)
			.and_then(|value| value.to_str().ok())
			.filter(|value| !value.is_empty() && *value != "null")
			.map(str::to_string);

		let csv = response.text().await?;
		Ok(ResultPage { csv, next_locator })
	}

	async fn create_ingest_job(
		&self,
		operation: BulkOperation,
		object: &str,
	) -> Result<JobInfo, CrmError> {
		let body = CreateIngestJobRequest::csv(operation, object);

		let response = self
			.http_client
			.post(self.url("ingest"))
			.json(&body)
			.send()
			.await?;
		let info: JobInfo = Self::read_json(Self::check(response).await?).await?;

		info!("{} job {} created for {}", operation, info.id, object);
		Ok(info)
	}

	async fn upload_job_data(&self, job_id: &str, csv: String) -> Result<(), CrmError> {
		let response = self
			.http_client
			.put(self.url(&format!("ingest/{}/batches", job_id)))
			.header(CONTENT_TYPE, "text/csv")
			.body(csv)
			.send()
			.await?;
		Self::check(response).await?;

		info!("Data added to job {}", job_id);
		Ok(())
	}

	async fn close_ingest_job(&self, job_id: &str) -> Result<JobInfo, CrmError> {
		let body = JobStateChange {
			state: JobState::UploadComplete,
		};

		let response = self
			.http_client
			.patch(self.url(&format!("ingest/{}", job_id)))
			.json(&body)
			.send()
			.await?;
		Self::read_json(Self::check(response).await?).await
	}

	async fn ingest_job_status(&self, job_id: &str) -> Result<JobInfo, CrmError> {
		let response = self
			.get_with_retry(&self.url(&format!("ingest/{}", job_id)), None)
			.await?;
		Self::read_json(response).await
	}

	async fn failed_results(&self, job_id: &str) -> Result<String, CrmError> {
		let response = self
			.get_with_retry(&self.url(&format!("ingest/{}/failedResults", job_id)), None)
			.await?;
		Ok(response.text().await?)
	}
}
