mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Connector, Elastic, GeocoderConfig, LlmProviderConfig, Postgres, Providers, Retry,
	Search, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("storage.elastic.url", &cfg.storage.elastic.url),
		("storage.elastic.index", &cfg.storage.elastic.index),
		("storage.elastic.connector_id", &cfg.storage.elastic.connector_id),
		("providers.filter_extractor.api_base", &cfg.providers.filter_extractor.api_base),
		("providers.filter_extractor.api_key", &cfg.providers.filter_extractor.api_key),
		("providers.geocoder.api_base", &cfg.providers.geocoder.api_base),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.postgres.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.elastic.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.elastic.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.search.page_size == 0 {
		return Err(Error::Validation {
			message: "search.page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_page_size < cfg.search.page_size {
		return Err(Error::Validation {
			message: "search.max_page_size must not be less than search.page_size.".to_string(),
		});
	}
	if cfg.search.rank_window_size == 0 {
		return Err(Error::Validation {
			message: "search.rank_window_size must be greater than zero.".to_string(),
		});
	}
	if cfg.search.rank_constant == 0 {
		return Err(Error::Validation {
			message: "search.rank_constant must be greater than zero.".to_string(),
		});
	}
	if cfg.search.location_fanout_limit == 0 {
		return Err(Error::Validation {
			message: "search.location_fanout_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.retry.max_attempts == 0 {
		return Err(Error::Validation {
			message: "retry.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.retry.base_delay_ms == 0 {
		return Err(Error::Validation {
			message: "retry.base_delay_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.retry.base_delay_ms > cfg.retry.max_delay_ms {
		return Err(Error::Validation {
			message: "retry.base_delay_ms must not exceed retry.max_delay_ms.".to_string(),
		});
	}
	if cfg.connector.liveness_window_secs <= 0 {
		return Err(Error::Validation {
			message: "connector.liveness_window_secs must be greater than zero.".to_string(),
		});
	}
	if !cfg.providers.geocoder.default_radius_km.is_finite()
		|| cfg.providers.geocoder.default_radius_km <= 0.0
	{
		return Err(Error::Validation {
			message: "providers.geocoder.default_radius_km must be a positive number.".to_string(),
		});
	}
	if !cfg.providers.filter_extractor.temperature.is_finite()
		|| cfg.providers.filter_extractor.temperature < 0.0
	{
		return Err(Error::Validation {
			message: "providers.filter_extractor.temperature must be zero or greater.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg
		.providers
		.geocoder
		.api_key
		.as_deref()
		.map(|key| key.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.providers.geocoder.api_key = None;
	}
}
