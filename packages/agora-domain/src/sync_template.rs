//! The generated SQL template behind the search-index sync connector.
//!
//! The connector pulls one row per released council subject, with nested JSON
//! arrays of speaker segments and contributions, restricted to a set of city
//! ids. Everything here is string-level handling of that template: safe
//! parameterization, literal materialization, scope-id extraction, and
//! structure-only comparison. Scope-id extraction is regex over SQL and
//! deliberately stays behind this module so a real SQL parser could replace it
//! without touching callers.

use regex::Regex;

use crate::{Error, Result};

/// The single substitution point. It appears exactly once, inside the
/// WHERE-clause membership test.
pub const SCOPE_PLACEHOLDER: &str = "{city_ids}";

pub const CANONICAL_TEMPLATE: &str = "\
SELECT
	s.id,
	s.title,
	s.description,
	s.location_text,
	s.date,
	m.city_id,
	s.person_ids,
	s.party_ids,
	s.topic_ids,
	COALESCE(seg.items, '[]'::json) AS speaker_segments,
	COALESCE(con.items, '[]'::json) AS contributions
FROM subjects s
JOIN meetings m ON m.id = s.meeting_id
LEFT JOIN LATERAL (
	SELECT json_agg(json_build_object('id', ss.id, 'text', ss.text, 'summary', ss.summary)) AS items
	FROM speaker_segments ss
	WHERE ss.subject_id = s.id
) seg ON TRUE
LEFT JOIN LATERAL (
	SELECT json_agg(json_build_object('id', co.id, 'text', co.text)) AS items
	FROM contributions co
	WHERE co.subject_id = s.id
) con ON TRUE
WHERE m.released = TRUE
	AND m.city_id IN ({city_ids})";

const MEMBERSHIP_TEST: &str = r"(?is)(city_id\s+IN\s*\()([^)]*)(\))";

#[derive(Debug, Clone)]
pub struct BuiltQuery {
	pub query: String,
	pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureValidation {
	pub structure_matches: bool,
	pub scope_ids_match: bool,
	pub actual_scope_ids: Vec<String>,
	pub expected_scope_ids: Vec<String>,
}

/// Replaces the placeholder with one positional marker per scope id. No
/// literal ever reaches the SQL text at this stage.
pub fn build(scope_ids: &[String]) -> Result<BuiltQuery> {
	if scope_ids.is_empty() {
		return Err(Error::EmptyScopeSet);
	}

	let markers =
		(1..=scope_ids.len()).map(|i| format!("${i}")).collect::<Vec<_>>().join(", ");
	let query = CANONICAL_TEMPLATE.replace(SCOPE_PLACEHOLDER, &markers);

	Ok(BuiltQuery { query, params: scope_ids.to_vec() })
}

/// Substitutes each positional marker with its single-quoted literal, doubling
/// embedded quote characters. This is the only step that embeds literals, and
/// it must only see values already validated against the scope catalog; the
/// result is handed to a raw-execution interface downstream.
pub fn materialize(query: &str, params: &[String]) -> String {
	let mut out = query.to_string();

	// Highest marker first, so replacing "$1" cannot clip "$10".
	for (index, value) in params.iter().enumerate().rev() {
		let marker = format!("${}", index + 1);
		let literal = format!("'{}'", value.replace('\'', "''"));

		out = out.replace(&marker, &literal);
	}

	out
}

/// Pulls the scope ids back out of a materialized query. A query without a
/// membership test yields an empty list; callers treat that as "unscoped",
/// not as an error.
pub fn extract_scope_ids(query: &str) -> Vec<String> {
	let Ok(re) = Regex::new(MEMBERSHIP_TEST) else {
		return Vec::new();
	};
	let Some(captures) = re.captures(query) else {
		return Vec::new();
	};

	captures[2]
		.split(',')
		.map(unquote)
		.filter(|token| !token.is_empty() && token != SCOPE_PLACEHOLDER)
		.collect()
}

/// Strips exactly one surrounding quote pair and undoes quote doubling, so a
/// value that itself starts or ends with a quote survives the trip.
fn unquote(token: &str) -> String {
	let trimmed = token.trim();

	if let Some(inner) = trimmed.strip_prefix('\'').and_then(|rest| rest.strip_suffix('\'')) {
		return inner.replace("''", "'");
	}
	if let Some(inner) = trimmed.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
		return inner.to_string();
	}

	trimmed.to_string()
}

/// Collapses a query to its shape: the membership-list content becomes the
/// fixed placeholder and whitespace runs become single spaces.
pub fn normalize(query: &str) -> String {
	let replaced = match Regex::new(MEMBERSHIP_TEST) {
		Ok(re) => re.replace(query, format!("${{1}}{SCOPE_PLACEHOLDER}${{3}}")).into_owned(),
		Err(_) => query.to_string(),
	};

	replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn same_structure(a: &str, b: &str) -> bool {
	normalize(a) == normalize(b)
}

/// Compares a remotely deployed query against the canonical template built for
/// the expected scope ids. Scope-id sets are compared unordered.
pub fn validate_structure(
	remote_query: &str,
	expected_scope_ids: &[String],
) -> Result<StructureValidation> {
	let built = build(expected_scope_ids)?;
	let canonical = materialize(&built.query, &built.params);
	let actual_scope_ids = extract_scope_ids(remote_query);
	let mut actual_sorted = actual_scope_ids.clone();
	let mut expected_sorted = expected_scope_ids.to_vec();

	actual_sorted.sort();
	expected_sorted.sort();

	Ok(StructureValidation {
		structure_matches: same_structure(remote_query, &canonical),
		scope_ids_match: actual_sorted == expected_sorted,
		actual_scope_ids,
		expected_scope_ids: expected_scope_ids.to_vec(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn scopes(ids: &[&str]) -> Vec<String> {
		ids.iter().map(|id| id.to_string()).collect()
	}

	#[test]
	fn placeholder_appears_exactly_once() {
		assert_eq!(CANONICAL_TEMPLATE.matches(SCOPE_PLACEHOLDER).count(), 1);
	}

	#[test]
	fn build_rejects_empty_scope_set() {
		assert!(build(&[]).is_err());
	}

	#[test]
	fn build_emits_one_marker_per_scope() {
		let built = build(&scopes(&["athens", "patras", "chania"])).unwrap();

		assert!(built.query.contains("IN ($1, $2, $3)"));
		assert_eq!(built.params, scopes(&["athens", "patras", "chania"]));
	}

	#[test]
	fn materialize_handles_double_digit_markers() {
		let ids: Vec<String> = (0..12).map(|i| format!("city-{i}")).collect();
		let built = build(&ids).unwrap();
		let materialized = materialize(&built.query, &built.params);

		assert!(materialized.contains("'city-11'"));
		assert!(!materialized.contains('$'));
	}

	#[test]
	fn materialize_doubles_embedded_quotes() {
		let built = build(&scopes(&["agia anna's"])).unwrap();
		let materialized = materialize(&built.query, &built.params);

		assert!(materialized.contains("'agia anna''s'"));
		// The quote count stays even, so the statement remains balanced.
		assert_eq!(materialized.matches('\'').count() % 2, 0);
	}

	#[test]
	fn extract_round_trips_build_and_materialize() {
		let ids = scopes(&["athens", "patras"]);
		let built = build(&ids).unwrap();
		let materialized = materialize(&built.query, &built.params);
		let mut extracted = extract_scope_ids(&materialized);
		let mut expected = ids.clone();

		extracted.sort();
		expected.sort();

		assert_eq!(extracted, expected);
	}

	#[test]
	fn extract_round_trips_ids_with_edge_quotes() {
		// Ids starting or ending with a quote still round-trip: only the one
		// surrounding quote pair is stripped, then doubling is undone.
		let ids = scopes(&["anna'", "'argos", "o'connell"]);
		let built = build(&ids).unwrap();
		let materialized = materialize(&built.query, &built.params);
		let mut extracted = extract_scope_ids(&materialized);
		let mut expected = ids.clone();

		extracted.sort();
		expected.sort();

		assert_eq!(extracted, expected);
	}

	#[test]
	fn extract_returns_empty_for_unscoped_query() {
		assert!(extract_scope_ids("SELECT * FROM subjects").is_empty());
	}

	#[test]
	fn structure_is_scope_invariant() {
		let a = build(&scopes(&["athens"])).unwrap();
		let b = build(&scopes(&["patras", "chania"])).unwrap();
		let a = materialize(&a.query, &a.params);
		let b = materialize(&b.query, &b.params);

		assert!(same_structure(&a, &b));
		assert_ne!(extract_scope_ids(&a), extract_scope_ids(&b));
	}

	#[test]
	fn normalize_collapses_whitespace_and_scope_list() {
		let reformatted = "SELECT  1\n\tFROM subjects   WHERE m.city_id IN ('athens' ,  'patras')";

		assert_eq!(
			normalize(reformatted),
			"SELECT 1 FROM subjects WHERE m.city_id IN ({city_ids})"
		);
	}

	#[test]
	fn validate_structure_reports_scope_mismatch() {
		let deployed = build(&scopes(&["athens"])).unwrap();
		let deployed = materialize(&deployed.query, &deployed.params);
		let validation = validate_structure(&deployed, &scopes(&["patras"])).unwrap();

		assert!(validation.structure_matches);
		assert!(!validation.scope_ids_match);
		assert_eq!(validation.actual_scope_ids, scopes(&["athens"]));
		assert_eq!(validation.expected_scope_ids, scopes(&["patras"]));
	}

	#[test]
	fn validate_structure_flags_foreign_shape() {
		let deployed = "SELECT id FROM other WHERE city_id IN ('athens')";
		let validation = validate_structure(deployed, &scopes(&["athens"])).unwrap();

		assert!(!validation.structure_matches);
		assert!(validation.scope_ids_match);
	}
}
