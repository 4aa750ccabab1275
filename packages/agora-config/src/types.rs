use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub storage: Storage,
	pub providers: Providers,
	pub search: Search,
	pub retry: Retry,
	pub connector: Connector,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub elastic: Elastic,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
	/// Upper bound on any single statement, connection acquisition included.
	pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Elastic {
	pub url: String,
	pub api_key: String,
	pub index: String,
	pub connector_id: String,
	pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub filter_extractor: LlmProviderConfig,
	pub geocoder: GeocoderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeocoderConfig {
	pub api_base: String,
	pub api_key: Option<String>,
	pub path: String,
	pub timeout_ms: u64,
	/// Radius attached to a resolved point when the phrase itself carries none.
	pub default_radius_km: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Search {
	#[serde(default = "default_page_size")]
	pub page_size: u32,
	#[serde(default = "default_max_page_size")]
	pub max_page_size: u32,
	#[serde(default = "default_true")]
	pub semantic_enabled: bool,
	#[serde(default = "default_rank_window_size")]
	pub rank_window_size: u32,
	#[serde(default = "default_rank_constant")]
	pub rank_constant: u32,
	/// Upper bound on concurrent per-city geocoding attempts when a location
	/// phrase arrives without a city scope.
	#[serde(default = "default_location_fanout_limit")]
	pub location_fanout_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Retry {
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_base_delay_ms")]
	pub base_delay_ms: u64,
	#[serde(default = "default_max_delay_ms")]
	pub max_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Connector {
	/// The connector counts as connected iff its last-seen timestamp is within
	/// this window.
	#[serde(default = "default_liveness_window_secs")]
	pub liveness_window_secs: i64,
}

fn default_page_size() -> u32 {
	10
}

fn default_max_page_size() -> u32 {
	100
}

fn default_true() -> bool {
	true
}

fn default_rank_window_size() -> u32 {
	100
}

fn default_rank_constant() -> u32 {
	60
}

fn default_location_fanout_limit() -> usize {
	10
}

fn default_max_attempts() -> u32 {
	3
}

fn default_base_delay_ms() -> u64 {
	2_000
}

fn default_max_delay_ms() -> u64 {
	10_000
}

fn default_liveness_window_secs() -> i64 {
	3_600
}
