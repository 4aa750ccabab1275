//! Retry wrapper for calls against the search engine.
//!
//! Pure timing and logging; the wrapped operation must be a safely repeatable
//! read (search queries, count queries). Think before wrapping a write: the
//! connector filtering replace is the only wrapped write, and only because it
//! replaces by value.

use std::{future::Future, time::Duration};

use crate::{Error, Result};

const RETRYABLE_STATUS: [u16; 4] = [408, 429, 503, 504];

/// Phrases the engine or an attached ranking model emits while still
/// cold-starting. "allocat" covers "allocating" and "allocation".
const COLD_START_MARKERS: [&str; 7] = [
	"model is being loaded",
	"model_loading",
	"deployment not found",
	"inference",
	"not ready",
	"starting",
	"allocat",
];

const CONNECTION_MARKERS: [&str; 6] =
	["connection refused", "connection reset", "timed out", "no live", "no alive", "abort"];

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
}
impl RetryPolicy {
	pub fn from_config(cfg: &agora_config::Retry) -> Self {
		Self {
			max_attempts: cfg.max_attempts,
			base_delay: Duration::from_millis(cfg.base_delay_ms),
			max_delay: Duration::from_millis(cfg.max_delay_ms),
		}
	}
}

/// Retryable iff the failure looks like infrastructure catching its breath:
/// a gateway-ish status, a connection-level fault, or a cold-start message.
pub fn is_transient(err: &Error) -> bool {
	match err {
		Error::Http { status, body } =>
			RETRYABLE_STATUS.contains(status) || has_marker(body, &COLD_START_MARKERS),
		Error::Reqwest(err) =>
			err.is_connect()
				|| err.is_timeout()
				|| has_marker(&err.to_string(), &CONNECTION_MARKERS),
		// Retrying a statement that already hit its deadline only multiplies
		// the stall.
		Error::Sqlx(_) | Error::InvalidArgument(_) | Error::NotFound(_) | Error::Timeout(_) =>
			false,
	}
}

pub async fn execute<T, F, Fut>(policy: &RetryPolicy, label: &'static str, op: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	execute_with(policy, op, |attempt, delay, summary| {
		tracing::warn!(
			label,
			attempt,
			delay_ms = delay.as_millis() as u64,
			error = summary,
			"Transient failure; retrying."
		);
	})
	.await
}

/// Like [`execute`] but with an explicit observability callback, invoked
/// before each retry with the attempt number, the computed delay, and the
/// error's display form. Non-retryable errors and exhaustion both propagate
/// the last error; nothing is ever swallowed. Delays run on the tokio clock,
/// so an enclosing `tokio::time::timeout` cancels mid-backoff.
pub async fn execute_with<T, F, Fut, C>(policy: &RetryPolicy, mut op: F, mut on_retry: C) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
	C: FnMut(u32, Duration, &str),
{
	let mut delay = policy.base_delay;
	let mut attempt = 1u32;

	loop {
		match op().await {
			Ok(value) => return Ok(value),
			Err(err) => {
				if attempt >= policy.max_attempts || !is_transient(&err) {
					return Err(err);
				}

				on_retry(attempt, delay, &err.to_string());

				tokio::time::sleep(delay).await;

				delay = delay.saturating_mul(2).min(policy.max_delay);
				attempt += 1;
			},
		}
	}
}

fn has_marker(text: &str, markers: &[&str]) -> bool {
	let lower = text.to_lowercase();

	markers.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
	use std::sync::{
		Arc, Mutex,
		atomic::{AtomicU32, Ordering},
	};

	use super::*;

	fn policy() -> RetryPolicy {
		RetryPolicy {
			max_attempts: 3,
			base_delay: Duration::from_millis(2_000),
			max_delay: Duration::from_millis(10_000),
		}
	}

	fn http(status: u16, body: &str) -> Error {
		Error::Http { status, body: body.to_string() }
	}

	#[test]
	fn classifies_gateway_statuses_as_transient() {
		for status in [408, 429, 503, 504] {
			assert!(is_transient(&http(status, "")), "status {status} must be transient");
		}
		for status in [400, 401, 404, 500] {
			assert!(!is_transient(&http(status, "")), "status {status} must be fatal");
		}
	}

	#[test]
	fn classifies_cold_start_messages_as_transient() {
		assert!(is_transient(&http(400, "Model is being loaded, try again")));
		assert!(is_transient(&http(500, "trained model deployment not found")));
		assert!(is_transient(&http(500, "Inference endpoint is ALLOCATING")));
		assert!(!is_transient(&http(400, "parsing_exception: unknown field")));
	}

	#[test]
	fn configuration_errors_are_never_transient() {
		assert!(!is_transient(&Error::NotFound("connector missing".to_string())));
		assert!(!is_transient(&Error::InvalidArgument("bad input".to_string())));
		assert!(!is_transient(&Error::Timeout(15_000)));
	}

	#[tokio::test(start_paused = true)]
	async fn retries_cold_start_then_succeeds() {
		let attempts = Arc::new(AtomicU32::new(0));
		let delays = Arc::new(Mutex::new(Vec::new()));
		let started = tokio::time::Instant::now();
		let op_attempts = attempts.clone();
		let seen_delays = delays.clone();
		let result = execute_with(
			&policy(),
			move || {
				let attempts = op_attempts.clone();
				async move {
					match attempts.fetch_add(1, Ordering::SeqCst) {
						0 | 1 => Err(http(503, "service unavailable")),
						_ => Ok(42),
					}
				}
			},
			move |_, delay, _| seen_delays.lock().unwrap().push(delay.as_millis() as u64),
		)
		.await;

		assert_eq!(result.unwrap(), 42);
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
		assert_eq!(*delays.lock().unwrap(), vec![2_000, 4_000]);
		assert_eq!(started.elapsed(), Duration::from_millis(6_000));
	}

	#[tokio::test(start_paused = true)]
	async fn fatal_error_fails_immediately() {
		let attempts = Arc::new(AtomicU32::new(0));
		let started = tokio::time::Instant::now();
		let op_attempts = attempts.clone();
		let result: Result<u32> = execute_with(
			&policy(),
			move || {
				let attempts = op_attempts.clone();
				async move {
					attempts.fetch_add(1, Ordering::SeqCst);

					Err(http(400, "parsing_exception"))
				}
			},
			|_, _, _| panic!("fatal errors must not trigger the retry callback"),
		)
		.await;

		assert!(matches!(result, Err(Error::Http { status: 400, .. })));
		assert_eq!(attempts.load(Ordering::SeqCst), 1);
		assert_eq!(started.elapsed(), Duration::ZERO);
	}

	#[tokio::test(start_paused = true)]
	async fn exhaustion_propagates_last_error() {
		let attempts = Arc::new(AtomicU32::new(0));
		let op_attempts = attempts.clone();
		let result: Result<u32> = execute_with(
			&policy(),
			move || {
				let attempts = op_attempts.clone();
				async move {
					attempts.fetch_add(1, Ordering::SeqCst);

					Err(http(503, "still unavailable"))
				}
			},
			|_, _, _| {},
		)
		.await;

		assert!(matches!(result, Err(Error::Http { status: 503, .. })));
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn delay_caps_at_max() {
		let policy = RetryPolicy {
			max_attempts: 5,
			base_delay: Duration::from_millis(2_000),
			max_delay: Duration::from_millis(10_000),
		};
		let delays = Arc::new(Mutex::new(Vec::new()));
		let seen_delays = delays.clone();
		let result: Result<u32> = execute_with(
			&policy,
			|| async { Err(http(503, "unavailable")) },
			move |_, delay, _| seen_delays.lock().unwrap().push(delay.as_millis() as u64),
		)
		.await;

		assert!(result.is_err());
		assert_eq!(*delays.lock().unwrap(), vec![2_000, 4_000, 8_000, 10_000]);
	}
}
