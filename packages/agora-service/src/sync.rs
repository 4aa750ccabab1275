//! Pre-deployment validation for sync-scope changes.
//!
//! A validation failure is a report, not an error: the caller receives the
//! full picture of what was checked and what went wrong, and only transport
//! or configuration faults surface as `Err`.

use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use agora_domain::sync_template::{self, StructureValidation};
use agora_storage::{db::Db, elastic::ElasticClient, queries, retry, retry::RetryPolicy};

use crate::{AgoraService, BoxFuture, ServiceResult};

const EMPTY_RESULT_WARNING: &str =
	"Query returned zero rows; the next sync would delete every indexed document.";

/// Outcome of one health check over a candidate query.
#[derive(Debug, Clone)]
pub struct ValidationCheck {
	pub valid: bool,
	pub row_count: Option<i64>,
	pub elapsed_ms: u64,
	pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SyncValidationReport {
	pub trace_id: Uuid,
	pub proposed_scope_ids: Vec<String>,
	pub missing_scope_ids: Vec<String>,
	pub remote: Option<ValidationCheck>,
	pub proposed: Option<ValidationCheck>,
	pub structure: Option<StructureValidation>,
	pub structure_diff: Option<String>,
	pub is_valid: bool,
	pub failure: Option<String>,
}

impl SyncValidationReport {
	fn failed(scope_ids: &[String], missing: Vec<String>, failure: String) -> Self {
		Self {
			trace_id: Uuid::new_v4(),
			proposed_scope_ids: scope_ids.to_vec(),
			missing_scope_ids: missing,
			remote: None,
			proposed: None,
			structure: None,
			structure_diff: None,
			is_valid: false,
			failure: Some(failure),
		}
	}
}

/// The backing data a validation run reads: the scope catalog, the currently
/// deployed sync query, and row counts for candidate queries.
pub trait ValidationStore
where
	Self: Send + Sync,
{
	fn existing_scope_ids<'a>(
		&'a self,
		ids: &'a [String],
	) -> BoxFuture<'a, agora_storage::Result<Vec<String>>>;

	fn deployed_query(&self) -> BoxFuture<'_, agora_storage::Result<Option<String>>>;

	fn count_rows<'a>(&'a self, query: &'a str) -> BoxFuture<'a, agora_storage::Result<i64>>;
}

struct LiveStore<'a> {
	db: &'a Db,
	elastic: &'a ElasticClient,
}

impl ValidationStore for LiveStore<'_> {
	fn existing_scope_ids<'a>(
		&'a self,
		ids: &'a [String],
	) -> BoxFuture<'a, agora_storage::Result<Vec<String>>> {
		Box::pin(queries::existing_city_ids(self.db, ids))
	}

	fn deployed_query(&self) -> BoxFuture<'_, agora_storage::Result<Option<String>>> {
		Box::pin(async {
			let config = self.elastic.get_connector().await?;

			Ok(config.active_snippet().map(|entry| entry.query.clone()))
		})
	}

	fn count_rows<'a>(&'a self, query: &'a str) -> BoxFuture<'a, agora_storage::Result<i64>> {
		Box::pin(queries::count_rows(self.db, query))
	}
}

impl AgoraService {
	/// Validates a proposed scope set end to end before anything is deployed:
	/// catalog existence, a dry run of the proposed query, a health check of
	/// the currently deployed query, and a structural comparison of the two.
	pub async fn validate_scope_update(
		&self,
		scope_ids: &[String],
	) -> ServiceResult<SyncValidationReport> {
		let store = LiveStore { db: &self.db, elastic: &self.elastic };

		run_validation(&store, &self.retry_policy(), scope_ids).await
	}
}

/// The validation run itself, against any [`ValidationStore`]. Input and
/// existence failures short-circuit before any count executes.
pub async fn run_validation(
	store: &dyn ValidationStore,
	policy: &RetryPolicy,
	scope_ids: &[String],
) -> ServiceResult<SyncValidationReport> {
	if scope_ids.is_empty() {
		return Ok(SyncValidationReport::failed(
			scope_ids,
			Vec::new(),
			"Scope set must not be empty.".to_string(),
		));
	}

	// Existence gates everything else. Counting rows for a scope set that
	// references unknown cities would only mask the real problem.
	let existing = store.existing_scope_ids(scope_ids).await?;
	let missing = missing_scope_ids(scope_ids, &existing);

	if !missing.is_empty() {
		return Ok(SyncValidationReport::failed(
			scope_ids,
			missing.clone(),
			format!("Unknown city ids: {}.", missing.join(", ")),
		));
	}

	let remote_query = store.deployed_query().await?;
	let built = sync_template::build(scope_ids)?;
	let proposed_query = sync_template::materialize(&built.query, &built.params);
	let (remote, proposed) = tokio::join!(
		run_remote_check(store, policy, remote_query.as_deref()),
		run_count_check(store, policy, &proposed_query),
	);
	let structure = remote_query
		.as_deref()
		.and_then(|query| sync_template::validate_structure(query, scope_ids).ok());
	let structure_diff = structure.as_ref().and_then(structure_diff);
	let is_valid = remote.as_ref().map(|check| check.valid).unwrap_or(true) && proposed.valid;
	let report = SyncValidationReport {
		trace_id: Uuid::new_v4(),
		proposed_scope_ids: scope_ids.to_vec(),
		missing_scope_ids: Vec::new(),
		remote,
		proposed: Some(proposed),
		structure,
		structure_diff,
		is_valid,
		failure: None,
	};

	info!(
		trace_id = %report.trace_id,
		is_valid = report.is_valid,
		scope_ids = ?report.proposed_scope_ids,
		"Scope validation completed."
	);

	Ok(report)
}

/// Health check of the currently deployed query. `None` when nothing is
/// deployed, which is a legitimate first-time state rather than a failure.
async fn run_remote_check(
	store: &dyn ValidationStore,
	policy: &RetryPolicy,
	remote_query: Option<&str>,
) -> Option<ValidationCheck> {
	let query = remote_query?;

	if !sync_template::same_structure(query, sync_template::CANONICAL_TEMPLATE) {
		warn!("Deployed sync query does not match the canonical shape.");
	}

	Some(run_count_check(store, policy, query).await)
}

async fn run_count_check(
	store: &dyn ValidationStore,
	policy: &RetryPolicy,
	query: &str,
) -> ValidationCheck {
	let started = Instant::now();
	let result = retry::execute_with(
		policy,
		|| store.count_rows(query),
		|attempt, delay, summary| {
			warn!(
				attempt,
				delay_ms = delay.as_millis() as u64,
				error = summary,
				"Transient failure counting sync rows; retrying."
			);
		},
	)
	.await;

	check_from_count(result, started.elapsed().as_millis() as u64)
}

/// Proposed ids with no catalog entry, in their proposed order.
pub fn missing_scope_ids(proposed: &[String], existing: &[String]) -> Vec<String> {
	proposed.iter().filter(|id| !existing.contains(id)).cloned().collect()
}

/// Folds a count result into a check. Zero rows counts as a failure: deploying
/// a query with no matches would empty the index on the next sync.
pub fn check_from_count(
	result: Result<i64, agora_storage::Error>,
	elapsed_ms: u64,
) -> ValidationCheck {
	match result {
		Ok(0) => ValidationCheck {
			valid: false,
			row_count: Some(0),
			elapsed_ms,
			error: Some(EMPTY_RESULT_WARNING.to_string()),
		},
		Ok(count) => ValidationCheck { valid: true, row_count: Some(count), elapsed_ms, error: None },
		Err(err) => ValidationCheck {
			valid: false,
			row_count: None,
			elapsed_ms,
			error: Some(classify_execution_error(&err.to_string())),
		},
	}
}

/// Distinguishes schema drift from other execution failures by message shape.
/// Postgres reports missing relations and columns with "does not exist".
pub fn classify_execution_error(message: &str) -> String {
	let lower = message.to_lowercase();
	let drift = lower.contains("does not exist")
		&& ["column", "relation", "table"].iter().any(|token| lower.contains(token));

	if drift {
		format!("Schema drift: {message}")
	} else {
		format!("Query execution failed: {message}")
	}
}

/// Advisory description of how the deployed query differs from the proposal.
/// A scope change alone is expected; a shape change deserves scrutiny.
pub fn structure_diff(validation: &StructureValidation) -> Option<String> {
	if !validation.structure_matches {
		return Some("Deployed query shape differs from the canonical template.".to_string());
	}
	if !validation.scope_ids_match {
		return Some(format!(
			"Current scope [{}] -> proposed scope [{}].",
			validation.actual_scope_ids.join(", "),
			validation.expected_scope_ids.join(", ")
		));
	}

	None
}
