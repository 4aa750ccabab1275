pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Scope id set must be non-empty.")]
	EmptyScopeSet,
	#[error("Invalid date range: start {start} is after end {end}.")]
	InvalidDateRange { start: time::Date, end: time::Date },
}
