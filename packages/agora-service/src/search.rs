use serde_json::{Value, json};
use time::{Date, OffsetDateTime};
use tokio::task::JoinSet;
use tracing::warn;
use uuid::Uuid;

use agora_domain::{
	CityRef, ComposedFilterSet, DateRange, ExtractedFilters, GeoLocation, RequestFilters,
	compose_filters,
};

use crate::{AgoraService, Providers, ServiceError, ServiceResult};

/// Fields returned for the light result shape. The detailed shape returns the
/// whole document.
const LIGHT_SOURCE_FIELDS: [&str; 5] = ["id", "title", "description", "date", "city_id"];

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SearchOptions {
	pub page_size: Option<u32>,
	pub page_from: Option<u32>,
	pub semantic: Option<bool>,
	pub rank_window_size: Option<u32>,
	pub rank_constant: Option<u32>,
	#[serde(default)]
	pub detailed: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchRequest {
	pub query: String,
	#[serde(default)]
	pub city_ids: Option<Vec<String>>,
	#[serde(default)]
	pub person_ids: Option<Vec<String>>,
	#[serde(default)]
	pub party_ids: Option<Vec<String>>,
	#[serde(default)]
	pub topic_ids: Option<Vec<String>>,
	#[serde(default)]
	pub date_range: Option<DateRange>,
	#[serde(default)]
	pub locations: Option<Vec<GeoLocation>>,
	#[serde(default)]
	pub options: SearchOptions,
}

impl SearchRequest {
	fn filters(&self) -> RequestFilters {
		RequestFilters {
			city_ids: self.city_ids.clone(),
			person_ids: self.person_ids.clone(),
			party_ids: self.party_ids.clone(),
			topic_ids: self.topic_ids.clone(),
			date_range: self.date_range,
			locations: self.locations.clone(),
		}
	}
}

/// The composed, executable query: up to two retrieval branches plus fusion
/// parameters. Both branches carry the identical filter set; only their match
/// clauses differ.
#[derive(Debug, Clone)]
pub struct RankedRetrievalPlan {
	pub lexical: Value,
	pub semantic: Option<Value>,
	pub size: u32,
	pub from: u32,
	pub rank_window_size: u32,
	pub rank_constant: u32,
	pub source_fields: Option<Vec<&'static str>>,
}

impl RankedRetrievalPlan {
	pub fn branch_count(&self) -> usize {
		1 + usize::from(self.semantic.is_some())
	}

	/// Renders the search-engine request body. With a single branch the fusion
	/// retriever degenerates to that branch's native ranking. Totals are
	/// always exact; downstream UIs display them.
	pub fn to_body(&self) -> Value {
		let mut body = json!({
			"size": self.size,
			"from": self.from,
			"track_total_hits": true,
		});

		match &self.semantic {
			Some(semantic) => {
				body["retriever"] = json!({
					"rrf": {
						"retrievers": [
							{ "standard": { "query": self.lexical } },
							{ "standard": { "query": semantic } },
						],
						"rank_window_size": self.rank_window_size,
						"rank_constant": self.rank_constant,
					}
				});
			},
			None => {
				body["query"] = self.lexical.clone();
			},
		}

		if let Some(fields) = &self.source_fields {
			body["_source"] = json!(fields);
		}

		body
	}
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchHit {
	pub id: Option<String>,
	pub score: Option<f64>,
	pub source: Value,
	pub matched_segment_ids: Vec<String>,
	pub matched_contribution_ids: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchResponse {
	pub trace_id: Uuid,
	pub total: u64,
	pub hits: Vec<SearchHit>,
}

/// Everything plan composition needs besides the request itself. Kept apart
/// from [`AgoraService`] so composition is exercisable without live clients.
pub struct PlanContext<'a> {
	pub providers: &'a Providers,
	pub provider_cfg: &'a agora_config::Providers,
	pub search_cfg: &'a agora_config::Search,
	pub catalog: &'a [CityRef],
	pub today: Date,
}

impl AgoraService {
	pub async fn search(&self, req: SearchRequest) -> ServiceResult<SearchResponse> {
		let catalog = agora_storage::queries::list_city_refs(&self.db).await?;
		let ctx = PlanContext {
			providers: &self.providers,
			provider_cfg: &self.cfg.providers,
			search_cfg: &self.cfg.search,
			catalog: &catalog,
			today: OffsetDateTime::now_utc().date(),
		};
		let plan = compose_plan(&ctx, &req).await?;
		let body = plan.to_body();
		let policy = self.retry_policy();
		let response =
			agora_storage::retry::execute(&policy, "search", || self.elastic.search(&body))
				.await?;

		Ok(parse_response(response))
	}
}

/// Builds the ranked retrieval plan for a request: extraction, merge,
/// location resolution, branch assembly. Extraction failures propagate; the
/// core never silently searches unfiltered.
pub async fn compose_plan(
	ctx: &PlanContext<'_>,
	req: &SearchRequest,
) -> ServiceResult<RankedRetrievalPlan> {
	validate_request(req, ctx.search_cfg)?;

	let extracted = ctx
		.providers
		.extractor
		.extract(&ctx.provider_cfg.filter_extractor, &req.query, ctx.catalog, ctx.today)
		.await?;
	let mut composed = compose_filters(&req.filters(), &extracted);
	let resolved = resolve_locations(ctx, &extracted, &composed).await?;
	let location_resolved = resolved.as_ref().map(|list| !list.is_empty()).unwrap_or(false);

	if let Some(locations) = resolved {
		composed.locations = if locations.is_empty() { None } else { Some(locations) };
	}

	Ok(build_plan(&req.query, &composed, location_resolved, ctx.search_cfg, &req.options))
}

fn validate_request(req: &SearchRequest, search_cfg: &agora_config::Search) -> ServiceResult<()> {
	if req.query.trim().is_empty() {
		return Err(ServiceError::InvalidRequest {
			message: "Query text is required and must be non-empty.".to_string(),
		});
	}
	if let Some(range) = &req.date_range
		&& range.start > range.end
	{
		return Err(ServiceError::InvalidRequest {
			message: "Date range start must not be after its end.".to_string(),
		});
	}
	if let Some(size) = req.options.page_size
		&& (size == 0 || size > search_cfg.max_page_size)
	{
		return Err(ServiceError::InvalidRequest {
			message: format!("page_size must be between 1 and {}.", search_cfg.max_page_size),
		});
	}

	Ok(())
}

/// `None` means the query implied no location phrase; locations pass through
/// from the request. `Some` carries the resolved points, possibly empty when
/// nothing matched.
async fn resolve_locations(
	ctx: &PlanContext<'_>,
	extracted: &ExtractedFilters,
	composed: &ComposedFilterSet,
) -> ServiceResult<Option<Vec<GeoLocation>>> {
	let Some(phrase) = extracted.location_name.as_deref() else {
		return Ok(None);
	};

	if let Some(ids) = composed.city_ids.as_deref() {
		let scoped: Vec<&CityRef> =
			ctx.catalog.iter().filter(|city| ids.contains(&city.id)).collect();
		// Resolution against an explicitly scoped city is load-bearing for the
		// caller's intent; its failure propagates.
		let mut locations = Vec::new();

		for city in scoped {
			if let Some(location) = ctx
				.providers
				.geocoder
				.resolve(&ctx.provider_cfg.geocoder, phrase, Some(city))
				.await?
			{
				locations.push(location);
			}
		}

		return Ok(Some(locations));
	}

	// No city scope: fan out one attempt per catalog city, concurrently and
	// capped. A city whose resolution fails contributes no location.
	let mut set = JoinSet::new();

	for city in ctx.catalog.iter().take(ctx.search_cfg.location_fanout_limit).cloned() {
		let geocoder = ctx.providers.geocoder.clone();
		let cfg = ctx.provider_cfg.geocoder.clone();
		let phrase = phrase.to_string();

		set.spawn(async move {
			let result = geocoder.resolve(&cfg, &phrase, Some(&city)).await;

			(city.id, result)
		});
	}

	let mut locations = Vec::new();

	while let Some(joined) = set.join_next().await {
		match joined {
			Ok((_, Ok(Some(location)))) => locations.push(location),
			Ok((_, Ok(None))) => {},
			Ok((city_id, Err(err))) => {
				warn!(city_id, error = %err, "Location resolution failed for city.");
			},
			Err(err) => {
				warn!(error = %err, "Location resolution task failed.");
			},
		}
	}

	Ok(Some(locations))
}

pub fn build_plan(
	query: &str,
	filters: &ComposedFilterSet,
	location_resolved: bool,
	search_cfg: &agora_config::Search,
	options: &SearchOptions,
) -> RankedRetrievalPlan {
	let clauses = filter_clauses(filters);
	let lexical = lexical_branch(query, location_resolved, &clauses);
	let semantic = options
		.semantic
		.unwrap_or(search_cfg.semantic_enabled)
		.then(|| semantic_branch(query, &clauses));

	RankedRetrievalPlan {
		lexical,
		semantic,
		size: options.page_size.unwrap_or(search_cfg.page_size),
		from: options.page_from.unwrap_or(0),
		rank_window_size: options.rank_window_size.unwrap_or(search_cfg.rank_window_size),
		rank_constant: options.rank_constant.unwrap_or(search_cfg.rank_constant),
		source_fields: (!options.detailed).then(|| LIGHT_SOURCE_FIELDS.to_vec()),
	}
}

/// The shared filter set: released-only always, the rest as composed.
pub fn filter_clauses(filters: &ComposedFilterSet) -> Vec<Value> {
	let mut clauses = vec![json!({ "term": { "released": true } })];

	for (field, ids) in [
		("city_id", &filters.city_ids),
		("person_ids", &filters.person_ids),
		("party_ids", &filters.party_ids),
		("topic_ids", &filters.topic_ids),
	] {
		if let Some(ids) = ids
			&& !ids.is_empty()
		{
			clauses.push(json!({ "terms": { field: ids } }));
		}
	}

	if let Some(range) = &filters.date_range {
		clauses.push(json!({ "range": { "date": { "gte": range.start, "lte": range.end } } }));
	}

	match filters.locations.as_deref() {
		Some([single]) => clauses.push(geo_clause(single)),
		Some(multiple) if !multiple.is_empty() => {
			// Match any location, each within its own radius.
			let should: Vec<Value> = multiple.iter().map(geo_clause).collect();

			clauses.push(json!({ "bool": { "should": should, "minimum_should_match": 1 } }));
		},
		_ => {},
	}

	clauses
}

fn geo_clause(location: &GeoLocation) -> Value {
	json!({
		"geo_distance": {
			"distance": format!("{}km", location.radius_km),
			"location": { "lat": location.point.lat, "lon": location.point.lon },
		}
	})
}

fn lexical_branch(query: &str, location_resolved: bool, filter_clauses: &[Value]) -> Value {
	let mut fields = vec![json!("title^3"), json!("description^2")];

	if location_resolved {
		fields.push(json!("location_text^2"));
	}

	let should = vec![
		json!({
			"multi_match": { "query": query, "fields": fields, "type": "best_fields" }
		}),
		json!({
			"nested": {
				"path": "speaker_segments",
				"query": {
					"multi_match": {
						"query": query,
						"fields": ["speaker_segments.text", "speaker_segments.summary"],
					}
				},
				"inner_hits": { "_source": ["speaker_segments.id"], "size": 3 },
			}
		}),
		json!({
			"nested": {
				"path": "contributions",
				"query": { "match": { "contributions.text": query } },
				"inner_hits": { "_source": ["contributions.id"], "size": 3 },
			}
		}),
	];

	json!({
		"bool": {
			"filter": filter_clauses,
			"should": should,
			"minimum_should_match": 1,
		}
	})
}

fn semantic_branch(query: &str, filter_clauses: &[Value]) -> Value {
	json!({
		"bool": {
			"filter": filter_clauses,
			"should": [
				{ "semantic": { "field": "title_semantic", "query": query, "boost": 2.0 } },
				{ "semantic": { "field": "description_semantic", "query": query, "boost": 1.0 } },
			],
			"minimum_should_match": 1,
		}
	})
}

pub fn parse_response(value: Value) -> SearchResponse {
	let total = value["hits"]["total"]["value"].as_u64().unwrap_or(0);
	let hits = value["hits"]["hits"]
		.as_array()
		.map(|hits| hits.iter().map(parse_hit).collect())
		.unwrap_or_default();

	SearchResponse { trace_id: Uuid::new_v4(), total, hits }
}

fn parse_hit(hit: &Value) -> SearchHit {
	SearchHit {
		id: hit["_id"].as_str().map(str::to_string),
		score: hit["_score"].as_f64(),
		source: hit["_source"].clone(),
		matched_segment_ids: nested_ids(hit, "speaker_segments"),
		matched_contribution_ids: nested_ids(hit, "contributions"),
	}
}

fn nested_ids(hit: &Value, path: &str) -> Vec<String> {
	hit["inner_hits"][path]["hits"]["hits"]
		.as_array()
		.map(|inner| {
			inner
				.iter()
				.filter_map(|item| item["_source"]["id"].as_str().map(str::to_string))
				.collect()
		})
		.unwrap_or_default()
}
