use std::time::Duration;

use color_eyre::Result;
use reqwest::Client;
use serde_json::Value;

use agora_domain::{CityRef, GeoLocation, GeoPoint};

/// Resolves a location phrase to a point, biased toward the given city's
/// center when one is in scope. "Nothing found" is `Ok(None)`, never an
/// error; callers simply get no geo filter for that city.
pub async fn resolve_location(
	cfg: &agora_config::GeocoderConfig,
	phrase: &str,
	city: Option<&CityRef>,
) -> Result<Option<GeoLocation>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let query_text = match city {
		Some(city) => format!("{phrase}, {}", city.name),
		None => phrase.to_string(),
	};
	let mut request = client.get(&url).query(&[("q", query_text.as_str()), ("limit", "1")]);

	if let Some(city) = city {
		request = request.query(&[
			("lat", city.center.lat.to_string().as_str()),
			("lon", city.center.lon.to_string().as_str()),
		]);
	}
	if let Some(key) = cfg.api_key.as_deref() {
		request = request.query(&[("api_key", key)]);
	}

	let json: Value = request.send().await?.error_for_status()?.json().await?;

	Ok(parse_geocode_json(&json).map(|point| GeoLocation {
		point,
		radius_km: cfg.default_radius_km,
		label: Some(phrase.to_string()),
	}))
}

fn parse_geocode_json(json: &Value) -> Option<GeoPoint> {
	let candidate = json.as_array()?.first()?;
	let lat = coordinate(candidate.get("lat")?)?;
	let lon = coordinate(candidate.get("lon")?)?;

	Some(GeoPoint { lat, lon })
}

// Some geocoders ship coordinates as strings, some as numbers.
fn coordinate(value: &Value) -> Option<f64> {
	value.as_f64().or_else(|| value.as_str()?.trim().parse().ok())
}
