pub mod connector;
pub mod search;
pub mod sync;

mod error;

pub use connector::ConnectorStatus;
pub use error::{ServiceError, ServiceResult};
pub use search::{
	PlanContext, RankedRetrievalPlan, SearchHit, SearchOptions, SearchRequest, SearchResponse,
};
pub use sync::{SyncValidationReport, ValidationCheck, ValidationStore, run_validation};

use std::{future::Future, pin::Pin, sync::Arc};

use time::Date;

use agora_config::Config;
use agora_domain::{CityRef, ExtractedFilters, GeoLocation};
use agora_providers::{extractor, geocode};
use agora_storage::{db::Db, elastic::ElasticClient, retry::RetryPolicy};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait FilterExtractor
where
	Self: Send + Sync,
{
	fn extract<'a>(
		&'a self,
		cfg: &'a agora_config::LlmProviderConfig,
		query: &'a str,
		cities: &'a [CityRef],
		today: Date,
	) -> BoxFuture<'a, color_eyre::Result<ExtractedFilters>>;
}

pub trait LocationResolver
where
	Self: Send + Sync,
{
	fn resolve<'a>(
		&'a self,
		cfg: &'a agora_config::GeocoderConfig,
		phrase: &'a str,
		city: Option<&'a CityRef>,
	) -> BoxFuture<'a, color_eyre::Result<Option<GeoLocation>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub extractor: Arc<dyn FilterExtractor>,
	pub geocoder: Arc<dyn LocationResolver>,
}

struct DefaultProviders;

impl FilterExtractor for DefaultProviders {
	fn extract<'a>(
		&'a self,
		cfg: &'a agora_config::LlmProviderConfig,
		query: &'a str,
		cities: &'a [CityRef],
		today: Date,
	) -> BoxFuture<'a, color_eyre::Result<ExtractedFilters>> {
		Box::pin(extractor::extract_filters(cfg, query, cities, today))
	}
}

impl LocationResolver for DefaultProviders {
	fn resolve<'a>(
		&'a self,
		cfg: &'a agora_config::GeocoderConfig,
		phrase: &'a str,
		city: Option<&'a CityRef>,
	) -> BoxFuture<'a, color_eyre::Result<Option<GeoLocation>>> {
		Box::pin(geocode::resolve_location(cfg, phrase, city))
	}
}

impl Providers {
	pub fn new(extractor: Arc<dyn FilterExtractor>, geocoder: Arc<dyn LocationResolver>) -> Self {
		Self { extractor, geocoder }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);
		Self { extractor: provider.clone(), geocoder: provider }
	}
}

pub struct AgoraService {
	pub cfg: Config,
	pub db: Db,
	pub elastic: ElasticClient,
	pub providers: Providers,
}

impl AgoraService {
	pub fn new(cfg: Config, db: Db, elastic: ElasticClient) -> Self {
		Self { cfg, db, elastic, providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, db: Db, elastic: ElasticClient, providers: Providers) -> Self {
		Self { cfg, db, elastic, providers }
	}

	pub(crate) fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy::from_config(&self.cfg.retry)
	}
}
