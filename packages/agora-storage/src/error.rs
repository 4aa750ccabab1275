#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Statement timed out after {0} ms.")]
	Timeout(u64),
	#[error("HTTP {status}: {body}")]
	Http { status: u16, body: String },
}
