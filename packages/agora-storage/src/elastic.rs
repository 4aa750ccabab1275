use std::time::Duration;

use reqwest::{
	Client, StatusCode,
	header::{AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde_json::Value;

use crate::{
	Error, Result,
	models::{ConnectorConfig, SyncJob},
};

const MAX_ERROR_BODY_CHARS: usize = 1_024;

/// Client for the search engine's query and connector-management endpoints.
/// Constructed once at process start and injected wherever needed.
pub struct ElasticClient {
	client: Client,
	base_url: String,
	pub index: String,
	pub connector_id: String,
}
impl ElasticClient {
	pub fn new(cfg: &agora_config::Elastic) -> Result<Self> {
		let mut headers = HeaderMap::new();
		let auth = HeaderValue::from_str(&format!("ApiKey {}", cfg.api_key)).map_err(|_| {
			Error::InvalidArgument("Elastic api_key is not a valid header value.".to_string())
		})?;

		headers.insert(AUTHORIZATION, auth);

		let client = Client::builder()
			.default_headers(headers)
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.build()?;

		Ok(Self {
			client,
			base_url: cfg.url.trim_end_matches('/').to_string(),
			index: cfg.index.clone(),
			connector_id: cfg.connector_id.clone(),
		})
	}

	pub async fn search(&self, body: &Value) -> Result<Value> {
		let url = format!("{}/{}/_search", self.base_url, self.index);
		let res = self.client.post(&url).json(body).send().await?;

		read_json(res).await
	}

	/// A missing connector is a setup problem, not a transient one; it maps to
	/// `NotFound` and is never retried.
	pub async fn get_connector(&self) -> Result<ConnectorConfig> {
		let url = format!("{}/connector/{}", self.base_url, self.connector_id);
		let res = self.client.get(&url).send().await?;

		if res.status() == StatusCode::NOT_FOUND {
			return Err(Error::NotFound(format!(
				"Connector {} does not exist.",
				self.connector_id
			)));
		}

		let json = read_json(res).await?;

		serde_json::from_value(json).map_err(|err| {
			Error::InvalidArgument(format!("Connector payload failed to parse: {err}."))
		})
	}

	/// Replaces the connector's filtering rule wholesale. Replace-by-value is
	/// idempotent, so wrapping this in the retry policy is safe.
	pub async fn put_filtering(&self, query: &str) -> Result<()> {
		let url = format!("{}/connector/{}/filtering", self.base_url, self.connector_id);
		let res = self.client.put(&url).json(&filtering_payload(query)).send().await?;

		read_json(res).await.map(|_| ())
	}

	pub async fn latest_sync_job(&self) -> Result<Option<SyncJob>> {
		let url = format!("{}/connector/{}/sync_jobs", self.base_url, self.connector_id);
		let res = self.client.get(&url).query(&[("size", "1")]).send().await?;
		let json = read_json(res).await?;

		Ok(parse_sync_jobs(&json))
	}
}

/// The connector's expected filtering-rule shape: one rule over the subjects
/// table carrying the materialized query as an advanced snippet.
pub fn filtering_payload(query: &str) -> Value {
	serde_json::json!({
		"advanced_snippet": {
			"value": [
				{ "tables": ["subjects"], "query": query }
			]
		}
	})
}

fn parse_sync_jobs(json: &Value) -> Option<SyncJob> {
	json.get("results")?
		.as_array()?
		.first()
		.and_then(|job| serde_json::from_value(job.clone()).ok())
}

async fn read_json(res: reqwest::Response) -> Result<Value> {
	let status = res.status();

	if !status.is_success() {
		let mut body = res.text().await.unwrap_or_default();

		body.truncate(body.chars().take(MAX_ERROR_BODY_CHARS).map(char::len_utf8).sum());

		return Err(Error::Http { status: status.as_u16(), body });
	}

	Ok(res.json().await?)
}
