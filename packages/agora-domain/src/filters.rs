use serde::{Deserialize, Serialize};
use time::Date;

use crate::{Error, Result};

/// One entry of the city catalog. City ids are the scope ids that drive both
/// search filtering and connector sync scoping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityRef {
	pub id: String,
	pub name: String,
	pub name_en: Option<String>,
	pub center: GeoPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
	pub lat: f64,
	pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
	pub point: GeoPoint,
	pub radius_km: f64,
	pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
	pub start: Date,
	pub end: Date,
}
impl DateRange {
	pub fn new(start: Date, end: Date) -> Result<Self> {
		if start > end {
			return Err(Error::InvalidDateRange { start, end });
		}

		Ok(Self { start, end })
	}
}

/// Filters implied by the free-text query, as returned by the extractor
/// collaborator. Every absent filter is an explicit `None`; the provider layer
/// rejects payloads that omit a key outright, so merge logic can trust that
/// `None` means "not requested" rather than "not reported".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedFilters {
	pub city_ids: Option<Vec<String>>,
	pub date_range: Option<DateRange>,
	pub latest_only: Option<bool>,
	pub location_name: Option<String>,
}

/// Filters stated explicitly on the search request, usually ambient UI state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestFilters {
	pub city_ids: Option<Vec<String>>,
	pub person_ids: Option<Vec<String>>,
	pub party_ids: Option<Vec<String>>,
	pub topic_ids: Option<Vec<String>>,
	pub date_range: Option<DateRange>,
	pub locations: Option<Vec<GeoLocation>>,
}

/// The merged filter set a retrieval plan is built from. `released_only` is
/// always true; no caller can opt out of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposedFilterSet {
	pub released_only: bool,
	pub city_ids: Option<Vec<String>>,
	pub person_ids: Option<Vec<String>>,
	pub party_ids: Option<Vec<String>>,
	pub topic_ids: Option<Vec<String>>,
	pub date_range: Option<DateRange>,
	pub locations: Option<Vec<GeoLocation>>,
	pub latest_only: bool,
}

/// Merges explicit request filters with extracted ones. An extracted value,
/// when present, wins over the explicit one for city scope and date range:
/// the natural-language reading of the query is more specific than ambient UI
/// state. Locations stay as the request gave them; the caller overwrites them
/// after resolving `extracted.location_name`.
pub fn compose_filters(
	request: &RequestFilters,
	extracted: &ExtractedFilters,
) -> ComposedFilterSet {
	ComposedFilterSet {
		released_only: true,
		city_ids: extracted.city_ids.clone().or_else(|| request.city_ids.clone()),
		person_ids: request.person_ids.clone(),
		party_ids: request.party_ids.clone(),
		topic_ids: request.topic_ids.clone(),
		date_range: extracted.date_range.or(request.date_range),
		locations: request.locations.clone(),
		latest_only: extracted.latest_only.unwrap_or(false),
	}
}
