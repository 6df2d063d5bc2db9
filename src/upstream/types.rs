//! Typed request/response shapes for the three MediaWiki calls the client issues.

use std::collections::HashMap;

/// One entry from `list=recentchanges`.
#[derive(Clone, Debug)]
pub struct RecentChangeEntry {
	/// The changed page's title, as returned by the API (not yet normalized).
	pub title: String,
	/// The change's ISO-8601 timestamp.
	pub timestamp: String,
	/// The user who made the change.
	pub user: String,
}

/// The result of one `recent_changes` call.
#[derive(Clone, Debug, Default)]
pub struct RecentChangesResult {
	/// Entries in this page of results, newest first.
	pub changes: Vec<RecentChangeEntry>,
	/// Opaque continuation token to pass to the next call, or `None` if this was the last page.
	pub continuation: Option<serde_json::Value>,
}

/// Per-title result from a `metadata` call.
#[derive(Clone, Copy, Debug)]
pub struct PageMetadata {
	/// True if the title does not exist upstream.
	pub missing: bool,
	/// The latest revision id, when the title exists.
	pub last_revid: Option<i64>,
}

/// Per-title result map from a `metadata` call.
pub type MetadataResult = HashMap<String, PageMetadata>;

/// One page parsed out of an `export` response.
#[derive(Clone, Debug)]
pub struct ExportedPage {
	/// The exported page's title.
	pub title: String,
	/// The exported revision id.
	pub revid: i64,
	/// The revision's wikitext contents.
	pub text: String,
}
