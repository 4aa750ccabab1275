use serde::Deserialize;
use time::OffsetDateTime;

/// Live connector state, as the management API reports it. Always fetched
/// fresh; other operators edit the connector out-of-band, so caching any of
/// this would turn validation into a stale read.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorConfig {
	pub id: String,
	#[serde(default)]
	pub index_name: String,
	#[serde(default)]
	pub filtering: Vec<FilteringRule>,
	#[serde(default)]
	pub status: Option<String>,
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub last_seen: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilteringRule {
	#[serde(default)]
	pub active: Option<AdvancedSnippetHolder>,
	#[serde(default)]
	pub draft: Option<AdvancedSnippetHolder>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvancedSnippetHolder {
	#[serde(default)]
	pub advanced_snippet: AdvancedSnippet,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvancedSnippet {
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub updated_at: Option<OffsetDateTime>,
	#[serde(default)]
	pub value: Vec<SnippetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnippetEntry {
	#[serde(default)]
	pub tables: Vec<String>,
	pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncJob {
	pub id: String,
	#[serde(default)]
	pub status: Option<String>,
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub started_at: Option<OffsetDateTime>,
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub completed_at: Option<OffsetDateTime>,
	#[serde(default)]
	pub error: Option<String>,
}

impl ConnectorConfig {
	/// The active advanced-snippet entry for the subjects table, if one is
	/// deployed.
	pub fn active_snippet(&self) -> Option<&SnippetEntry> {
		self.filtering
			.iter()
			.filter_map(|rule| rule.active.as_ref())
			.flat_map(|holder| holder.advanced_snippet.value.iter())
			.next()
	}

	pub fn active_snippet_updated_at(&self) -> Option<OffsetDateTime> {
		self.filtering
			.iter()
			.filter_map(|rule| rule.active.as_ref())
			.find_map(|holder| holder.advanced_snippet.updated_at)
	}
}
