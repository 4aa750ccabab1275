use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::Result;

pub struct Db {
	pub pool: PgPool,
	/// Deadline applied to every statement issued through this pool.
	pub timeout: Duration,
}
impl Db {
	pub async fn connect(cfg: &agora_config::Postgres) -> Result<Self> {
		let timeout = Duration::from_millis(cfg.timeout_ms);
		let pool = PgPoolOptions::new()
			.max_connections(cfg.pool_max_conns)
			.acquire_timeout(timeout)
			.connect(&cfg.dsn)
			.await?;

		Ok(Self { pool, timeout })
	}
}
