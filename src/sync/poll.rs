//! Bounded polling with a fixed delay between attempts.

use std::future::Future;
use std::time::Duration;

/// How often and how many times to check a job's status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
	pub interval: Duration,
	/// `None` polls until the job reaches a terminal state
	pub max_attempts: Option<u32>,
}

impl PollSettings {
	pub fn new(interval: Duration, max_attempts: Option<u32>) -> Self {
		Self {
			interval,
			max_attempts,
		}
	}

}

/// Result of a poll loop that did not error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
	Ready { value: T, attempts: u32 },
	TimedOut { attempts: u32 },
}

/// Call `check` until it yields `Some`, sleeping `settings.interval` between calls.
///
/// `check` receives the 1-based attempt number. An `Err` from `check` ends the loop at once.
/// No sleep happens after the final attempt.
pub async fn poll_until<T, E, F, Fut>(settings: &PollSettings, mut check: F) -> Result<PollOutcome<T>, E>
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<Option<T>, E>>,
{
	let mut attempts = 0;
	loop {
		attempts += 1;
		if let Some(value) = check(attempts).await? {
			return Ok(PollOutcome::Ready { value, attempts });
		}
		if settings.max_attempts.is_some_and(|max| attempts >= max) {
			return Ok(PollOutcome::TimedOut { attempts });
		}
		tokio::time::sleep(settings.interval).await;
	}
}
