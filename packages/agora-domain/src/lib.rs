pub mod filters;
pub mod sync_template;

mod error;

pub use error::{Error, Result};
pub use filters::{
	CityRef, ComposedFilterSet, DateRange, ExtractedFilters, GeoLocation, GeoPoint, RequestFilters,
	compose_filters,
};
