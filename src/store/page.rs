//! A single cached page record.

/// One cached (wiki, title) page record.
///
/// Mirrors the `articles` table this store's schema is grounded on: `contents` reflects
/// `revision`, and `last_revision` is the newest revision id known as of the wiki's sync cursor.
/// `revision = Some(0)` is the sentinel for "confirmed absent upstream".
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct PageRecord {
	/// The page title, normalized per [`crate::title::normalize`].
	pub title: String,
	/// Textual contents at `revision`, or `None` if never fetched or confirmed absent.
	pub contents: Option<String>,
	/// The revision id `contents` reflects, or `None` if contents were never fetched.
	pub revision: Option<i64>,
	/// The latest known revision id as of the last metadata fetch or invalidation, or `None` if
	/// unknown (forcing a metadata refetch).
	pub last_revision: Option<i64>,
}
impl PageRecord {
	/// A freshly observed title with no known revision information.
	pub fn new(title: impl Into<String>) -> Self {
		Self { title: title.into(), contents: None, revision: None, last_revision: None }
	}

	/// True iff `last_revision` is known and matches `revision`.
	pub fn up_to_date(&self) -> bool {
		self.last_revision.is_some() && self.last_revision == self.revision
	}

	/// True iff this record is a confirmed-absent placeholder (`revision = Some(0)`).
	pub fn confirmed_absent(&self) -> bool {
		self.revision == Some(0)
	}

	/// Mark the page absent upstream: up to date at the sentinel revision `0`, with no contents.
	pub fn mark_absent(&mut self) {
		self.revision = Some(0);
		self.last_revision = Some(0);
		self.contents = None;
	}

	/// Record a successful export fetch: contents move to the fetched revision, which also
	/// becomes the known-latest revision.
	pub fn apply_export(&mut self, revid: i64, text: String) {
		self.revision = Some(revid);
		self.last_revision = Some(revid);
		self.contents = Some(text);
	}

	/// Record a metadata fetch's `last_revid`.
	pub fn apply_metadata(&mut self, last_revid: i64) {
		self.last_revision = Some(last_revid);
	}

	/// Invalidate the page: the latest known revision becomes unknown, forcing a metadata
	/// refetch. Contents are retained until a subsequent export overwrites them.
	pub fn invalidate(&mut self) {
		self.last_revision = None;
	}
}
