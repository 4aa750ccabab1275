use agora_domain::{
	ExtractedFilters, RequestFilters, compose_filters,
	sync_template::{build, extract_scope_ids, materialize, same_structure},
};

#[test]
fn scope_ids_round_trip_through_materialized_sql() {
	let cases: [&[&str]; 3] =
		[&["athens"], &["athens", "patras", "chania"], &["o'connell", "plain"]];

	for ids in cases {
		let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
		let built = build(&ids).expect("build failed");
		let materialized = materialize(&built.query, &built.params);
		let mut extracted = extract_scope_ids(&materialized);
		let mut expected = ids.clone();

		extracted.sort();
		expected.sort();

		assert_eq!(extracted, expected, "round trip failed for {ids:?}");
	}
}

#[test]
fn distinct_scope_sets_share_structure() {
	let a = build(&["athens".to_string()]).expect("build failed");
	let b = build(&["patras".to_string(), "chania".to_string()]).expect("build failed");
	let a = materialize(&a.query, &a.params);
	let b = materialize(&b.query, &b.params);

	assert!(same_structure(&a, &b));
	assert_ne!(extract_scope_ids(&a), extract_scope_ids(&b));
}

#[test]
fn extracted_filters_parse_explicit_nulls_as_absent() {
	let payload = r#"{
		"city_ids": null,
		"date_range": null,
		"latest_only": null,
		"location_name": null
	}"#;
	let extracted: ExtractedFilters = serde_json::from_str(payload).expect("parse failed");
	let composed = compose_filters(
		&RequestFilters { city_ids: Some(vec!["patras".to_string()]), ..Default::default() },
		&extracted,
	);

	// A null extraction must not clobber the explicit request scope.
	assert_eq!(composed.city_ids.as_deref(), Some(["patras".to_string()].as_slice()));
}
