use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use agora_domain::{CityRef, DateRange, ExtractedFilters};

const DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// Asks the language-model endpoint to turn a free-text query into structured
/// filters. The prompt carries the city catalog and a reference date so
/// relative phrases ("last month") resolve deterministically. The response
/// must carry all four filter keys, null when absent; anything else is a
/// provider error, never a silent unfiltered search.
pub async fn extract_filters(
	cfg: &agora_config::LlmProviderConfig,
	query: &str,
	cities: &[CityRef],
	today: Date,
) -> Result<ExtractedFilters> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let messages = build_messages(query, cities, today)?;

	for _ in 0..3 {
		let body = serde_json::json!({
			"model": cfg.model,
			"temperature": cfg.temperature,
			"messages": messages,
		});
		let res = client
			.post(&url)
			.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		if let Ok(parsed) = parse_extractor_json(json).and_then(|value| parse_filters(&value)) {
			return Ok(parsed);
		}
	}

	Err(eyre::eyre!("Filter extractor did not return valid filter JSON."))
}

fn build_messages(query: &str, cities: &[CityRef], today: Date) -> Result<Vec<Value>> {
	let catalog = cities
		.iter()
		.map(|city| match city.name_en.as_deref() {
			Some(name_en) => format!("- {}: {} ({name_en})", city.id, city.name),
			None => format!("- {}: {}", city.id, city.name),
		})
		.collect::<Vec<_>>()
		.join("\n");
	let today = today.format(DATE_FORMAT)?;
	let system = "\
You extract search filters from queries about municipal council records. \
Reply with a single JSON object holding exactly these keys: \
\"city_ids\" (array of catalog city ids, or null), \
\"date_range\" (object with \"start\" and \"end\" as YYYY-MM-DD, or null), \
\"latest_only\" (boolean, or null), \
\"location_name\" (a place phrase inside a city, or null). \
Every key must be present; use null for anything the query does not imply.";
	let user = format!("Known cities:\n{catalog}\n\nToday: {today}\n\nQuery: {query}");

	Ok(vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": user }),
	])
}

fn parse_extractor_json(json: Value) -> Result<Value> {
	if let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
	{
		let parsed: Value = serde_json::from_str(content)
			.map_err(|_| eyre::eyre!("Extractor content is not valid JSON."))?;

		return Ok(parsed);
	}

	if json.is_object() {
		return Ok(json);
	}

	Err(eyre::eyre!("Extractor response is missing JSON content."))
}

/// Strict parse: all four keys must be present, even when null. A missing key
/// would blur "not requested" into "not reported" and break merge semantics.
fn parse_filters(value: &Value) -> Result<ExtractedFilters> {
	let Some(object) = value.as_object() else {
		return Err(eyre::eyre!("Extractor payload is not an object."));
	};

	for key in ["city_ids", "date_range", "latest_only", "location_name"] {
		if !object.contains_key(key) {
			return Err(eyre::eyre!("Extractor payload is missing the {key} key."));
		}
	}

	let city_ids = match &object["city_ids"] {
		Value::Null => None,
		Value::Array(items) => {
			let ids = items
				.iter()
				.map(|item| {
					item.as_str()
						.map(str::to_string)
						.ok_or_else(|| eyre::eyre!("city_ids entries must be strings."))
				})
				.collect::<Result<Vec<_>>>()?;

			if ids.is_empty() { None } else { Some(ids) }
		},
		_ => return Err(eyre::eyre!("city_ids must be an array or null.")),
	};
	let date_range = match &object["date_range"] {
		Value::Null => None,
		Value::Object(range) => Some(parse_date_range(range)?),
		_ => return Err(eyre::eyre!("date_range must be an object or null.")),
	};
	let latest_only = match &object["latest_only"] {
		Value::Null => None,
		Value::Bool(flag) => Some(*flag),
		_ => return Err(eyre::eyre!("latest_only must be a boolean or null.")),
	};
	let location_name = match &object["location_name"] {
		Value::Null => None,
		Value::String(name) if name.trim().is_empty() => None,
		Value::String(name) => Some(name.trim().to_string()),
		_ => return Err(eyre::eyre!("location_name must be a string or null.")),
	};

	Ok(ExtractedFilters { city_ids, date_range, latest_only, location_name })
}

fn parse_date_range(range: &serde_json::Map<String, Value>) -> Result<DateRange> {
	let parse_date = |key: &str| -> Result<Date> {
		let raw = range
			.get(key)
			.and_then(|v| v.as_str())
			.ok_or_else(|| eyre::eyre!("date_range.{key} must be a YYYY-MM-DD string."))?;

		Date::parse(raw, DATE_FORMAT)
			.map_err(|_| eyre::eyre!("date_range.{key} is not a valid YYYY-MM-DD date."))
	};
	let start = parse_date("start")?;
	let end = parse_date("end")?;

	DateRange::new(start, end).map_err(|err| eyre::eyre!("{err}"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_choice_content_filters() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "{\"city_ids\": [\"athens\"], \"date_range\": null, \"latest_only\": true, \"location_name\": null}" } }
			]
		});
		let filters =
			parse_extractor_json(json).and_then(|v| parse_filters(&v)).expect("parse failed");

		assert_eq!(filters.city_ids.as_deref(), Some(["athens".to_string()].as_slice()));
		assert_eq!(filters.latest_only, Some(true));
		assert!(filters.date_range.is_none());
		assert!(filters.location_name.is_none());
	}

	#[test]
	fn rejects_payload_with_missing_key() {
		let value = serde_json::json!({
			"city_ids": null,
			"date_range": null,
			"latest_only": null
		});

		assert!(parse_filters(&value).is_err());
	}

	#[test]
	fn parses_date_range_and_rejects_reversed_one() {
		let value = serde_json::json!({
			"city_ids": null,
			"date_range": { "start": "2025-07-01", "end": "2025-07-31" },
			"latest_only": null,
			"location_name": "κέντρο"
		});
		let filters = parse_filters(&value).expect("parse failed");

		assert!(filters.date_range.is_some());
		assert_eq!(filters.location_name.as_deref(), Some("κέντρο"));

		let reversed = serde_json::json!({
			"city_ids": null,
			"date_range": { "start": "2025-07-31", "end": "2025-07-01" },
			"latest_only": null,
			"location_name": null
		});

		assert!(parse_filters(&reversed).is_err());
	}

	#[test]
	fn empty_city_array_counts_as_absent() {
		let value = serde_json::json!({
			"city_ids": [],
			"date_range": null,
			"latest_only": null,
			"location_name": null
		});
		let filters = parse_filters(&value).expect("parse failed");

		assert!(filters.city_ids.is_none());
	}
}
