use time::{Duration, OffsetDateTime};
use tracing::warn;

use agora_domain::sync_template;
use agora_storage::models::{ConnectorConfig, SyncJob};

use crate::{AgoraService, ServiceResult};

/// A point-in-time view of the deployed connector, derived from a fresh fetch.
#[derive(Debug, Clone)]
pub struct ConnectorStatus {
	pub current_scope_ids: Vec<String>,
	pub current_query: Option<String>,
	pub query_updated_at: Option<OffsetDateTime>,
	pub is_valid: bool,
	pub is_connected: bool,
	pub last_seen: Option<OffsetDateTime>,
	pub status: Option<String>,
}

impl AgoraService {
	/// Fetches the connector's live configuration. Never cached; other
	/// operators edit the connector out-of-band.
	pub async fn connector_config(&self) -> ServiceResult<ConnectorConfig> {
		Ok(self.elastic.get_connector().await?)
	}

	/// Deploys a new scope set: builds the canonical query, materializes the
	/// scope literals, and replaces the connector's filtering rule. Returns
	/// the materialized query as deployed.
	pub async fn update_filtering_query(&self, scope_ids: &[String]) -> ServiceResult<String> {
		let built = sync_template::build(scope_ids)?;
		let materialized = sync_template::materialize(&built.query, &built.params);
		let policy = self.retry_policy();

		agora_storage::retry::execute(&policy, "put_filtering", || {
			self.elastic.put_filtering(&materialized)
		})
		.await?;

		Ok(materialized)
	}

	pub async fn connector_status(&self) -> ServiceResult<ConnectorStatus> {
		let config = self.connector_config().await?;
		let now = OffsetDateTime::now_utc();

		Ok(build_status(&config, now, self.cfg.connector.liveness_window_secs))
	}

	/// The most recent sync job, if the management API exposes one. Job
	/// history is advisory; a failure here degrades to `None` with a warning
	/// instead of failing the caller.
	pub async fn latest_sync_job(&self) -> Option<SyncJob> {
		match self.elastic.latest_sync_job().await {
			Ok(job) => job,
			Err(err) => {
				warn!(error = %err, "Failed to fetch the latest sync job.");

				None
			},
		}
	}
}

/// Derives status from a connector snapshot. The deployed query is valid when
/// its shape matches the canonical template; connectivity means a heartbeat
/// within the liveness window.
pub fn build_status(
	config: &ConnectorConfig,
	now: OffsetDateTime,
	liveness_window_secs: i64,
) -> ConnectorStatus {
	let current_query = config.active_snippet().map(|entry| entry.query.clone());
	let current_scope_ids = current_query
		.as_deref()
		.map(sync_template::extract_scope_ids)
		.unwrap_or_default();
	let is_valid = current_query
		.as_deref()
		.and_then(|query| sync_template::validate_structure(query, &current_scope_ids).ok())
		.map(|validation| validation.structure_matches)
		.unwrap_or(false);
	let is_connected = config
		.last_seen
		.map(|seen| now - seen <= Duration::seconds(liveness_window_secs))
		.unwrap_or(false);

	ConnectorStatus {
		current_scope_ids,
		current_query,
		query_updated_at: config.active_snippet_updated_at(),
		is_valid,
		is_connected,
		last_seen: config.last_seen,
		status: config.status.clone(),
	}
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	fn snapshot(query: Option<&str>, last_seen: Option<&str>) -> ConnectorConfig {
		let filtering = query
			.map(|q| {
				serde_json::json!([
					{
						"active": {
							"advanced_snippet": {
								"updated_at": "2026-08-20T08:30:00Z",
								"value": [ { "tables": ["subjects"], "query": q } ]
							}
						}
					}
				])
			})
			.unwrap_or_else(|| serde_json::json!([]));
		let payload = serde_json::json!({
			"id": "council-connector",
			"status": "connected",
			"last_seen": last_seen,
			"filtering": filtering,
		});

		serde_json::from_value(payload).expect("snapshot parse failed")
	}

	fn canonical(ids: &[&str]) -> String {
		let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
		let built = sync_template::build(&ids).unwrap();

		sync_template::materialize(&built.query, &built.params)
	}

	#[test]
	fn canonical_deployment_is_valid_and_connected() {
		let deployed = canonical(&["athens", "patras"]);
		let config = snapshot(Some(deployed.as_str()), Some("2026-08-23T09:30:00Z"));
		let status = build_status(&config, datetime!(2026-08-23 10:00:00 UTC), 3_600);

		assert!(status.is_valid);
		assert!(status.is_connected);
		assert_eq!(status.current_scope_ids, vec![
			"athens".to_string(),
			"patras".to_string()
		]);
	}

	#[test]
	fn stale_heartbeat_reports_disconnected() {
		let deployed = canonical(&["athens"]);
		let config = snapshot(Some(deployed.as_str()), Some("2026-08-23T08:00:00Z"));
		let status = build_status(&config, datetime!(2026-08-23 10:00:00 UTC), 3_600);

		assert!(status.is_valid);
		assert!(!status.is_connected);
	}

	#[test]
	fn foreign_query_shape_is_invalid() {
		let config = snapshot(
			Some("SELECT id FROM elsewhere WHERE city_id IN ('athens')"),
			Some("2026-08-23T09:59:00Z"),
		);
		let status = build_status(&config, datetime!(2026-08-23 10:00:00 UTC), 3_600);

		assert!(!status.is_valid);
		assert!(status.is_connected);
		assert_eq!(status.current_scope_ids, vec!["athens".to_string()]);
	}

	#[test]
	fn missing_snippet_yields_empty_invalid_status() {
		let config = snapshot(None, None);
		let status = build_status(&config, datetime!(2026-08-23 10:00:00 UTC), 3_600);

		assert!(!status.is_valid);
		assert!(!status.is_connected);
		assert!(status.current_query.is_none());
		assert!(status.current_scope_ids.is_empty());
	}
}
