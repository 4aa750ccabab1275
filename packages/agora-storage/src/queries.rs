use std::{future::Future, time::Duration};

use sqlx::Row;

use agora_domain::{CityRef, GeoPoint};

use crate::{Error, Result, db::Db};

/// Every statement runs under the pool's configured deadline; a stalled
/// statement must not hang a search or a validation run.
async fn with_timeout<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
	match tokio::time::timeout(limit, fut).await {
		Ok(result) => result,
		Err(_) => Err(Error::Timeout(limit.as_millis() as u64)),
	}
}

pub async fn list_city_refs(db: &Db) -> Result<Vec<CityRef>> {
	with_timeout(db.timeout, async {
		let rows = sqlx::query(
			"\
SELECT id, name, name_en, center_lat, center_lon
FROM cities
ORDER BY id",
		)
		.fetch_all(&db.pool)
		.await?;

		rows.into_iter()
			.map(|row| {
				Ok(CityRef {
					id: row.try_get("id")?,
					name: row.try_get("name")?,
					name_en: row.try_get("name_en")?,
					center: GeoPoint {
						lat: row.try_get("center_lat")?,
						lon: row.try_get("center_lon")?,
					},
				})
			})
			.collect()
	})
	.await
}

/// Which of the given ids exist in the scope catalog. The caller diffs the
/// result against its input to report dangling references.
pub async fn existing_city_ids(db: &Db, ids: &[String]) -> Result<Vec<String>> {
	with_timeout(db.timeout, async {
		let rows = sqlx::query_scalar("SELECT id FROM cities WHERE id = ANY($1)")
			.bind(ids)
			.fetch_all(&db.pool)
			.await?;

		Ok(rows)
	})
	.await
}

/// Wraps a materialized sync query in a COUNT over a subquery, the shape both
/// validation health checks execute.
pub fn wrap_count(query: &str) -> String {
	format!("SELECT COUNT(*) FROM ({}) AS sync_rows", query.trim().trim_end_matches(';'))
}

/// Executes the COUNT wrapper over the raw query text. The query must come
/// from the sync template; this is the raw-execution interface the template's
/// materialization step guards.
pub async fn count_rows(db: &Db, query: &str) -> Result<i64> {
	let sql = wrap_count(query);

	with_timeout(db.timeout, async {
		let count: i64 = sqlx::query_scalar(&sql).fetch_one(&db.pool).await?;

		Ok(count)
	})
	.await
}
