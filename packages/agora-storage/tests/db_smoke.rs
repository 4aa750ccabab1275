use agora_config::Postgres;
use agora_storage::{db::Db, queries};

fn env_dsn() -> Option<String> {
	std::env::var("AGORA_PG_DSN").ok()
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set AGORA_PG_DSN to run."]
async fn catalog_queries_round_trip() {
	let Some(dsn) = env_dsn() else {
		eprintln!("Skipping catalog_queries_round_trip; set AGORA_PG_DSN to run this test.");

		return;
	};
	// One connection so the temporary table stays visible to every query.
	let cfg = Postgres { dsn, pool_max_conns: 1, timeout_ms: 15_000 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	sqlx::query(
		"\
CREATE TEMPORARY TABLE cities (
	id TEXT PRIMARY KEY,
	name TEXT NOT NULL,
	name_en TEXT,
	center_lat DOUBLE PRECISION NOT NULL,
	center_lon DOUBLE PRECISION NOT NULL
)",
	)
	.execute(&db.pool)
	.await
	.expect("Failed to create temp cities table.");

	sqlx::query(
		"\
INSERT INTO cities (id, name, name_en, center_lat, center_lon)
VALUES
	('athens', 'Αθήνα', 'Athens', 37.9838, 23.7275),
	('patras', 'Πάτρα', 'Patras', 38.2466, 21.7346)",
	)
	.execute(&db.pool)
	.await
	.expect("Failed to seed temp cities table.");

	let catalog = queries::list_city_refs(&db).await.expect("Failed to list city refs.");

	assert_eq!(catalog.len(), 2);
	assert_eq!(catalog[0].id, "athens");
	assert_eq!(catalog[0].name_en.as_deref(), Some("Athens"));

	let existing = queries::existing_city_ids(&db, &[
		"athens".to_string(),
		"atlantis".to_string(),
	])
	.await
	.expect("Failed to check existing ids.");

	assert_eq!(existing, vec!["athens".to_string()]);

	let count = queries::count_rows(&db, "SELECT id FROM cities WHERE id = 'athens'")
		.await
		.expect("Failed to count rows.");

	assert_eq!(count, 1);
}
