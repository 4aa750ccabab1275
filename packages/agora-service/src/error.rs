pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Configuration error: {message}")]
	Configuration { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Search engine error: {message}")]
	Elastic { message: String },
}

impl From<agora_storage::Error> for ServiceError {
	fn from(err: agora_storage::Error) -> Self {
		match err {
			agora_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			inner @ agora_storage::Error::Timeout(_) =>
				Self::Storage { message: inner.to_string() },
			agora_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			agora_storage::Error::NotFound(message) => Self::Configuration { message },
			inner @ (agora_storage::Error::Reqwest(_) | agora_storage::Error::Http { .. }) =>
				Self::Elastic { message: inner.to_string() },
		}
	}
}

impl From<agora_domain::Error> for ServiceError {
	fn from(err: agora_domain::Error) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}

impl From<color_eyre::Report> for ServiceError {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
