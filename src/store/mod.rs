//! The persistent, transactional table store backing the cache.
//!
//! Realized as an embedded SQLite database reached through `sqlx`. One [`Store`] instance caches
//! exactly one wiki; every operation is implicitly scoped to it. The store is the cache itself —
//! there is no separate in-memory eviction layer.

mod page;
mod schema;
mod wiki;

use std::str::FromStr;

// crates.io
use sqlx::{Sqlite, SqlitePool, Transaction, sqlite::SqliteConnectOptions};
// self
use crate::_prelude::*;
pub use page::PageRecord;
pub use wiki::WikiRecord;

/// A handle to the persistent page/wiki store.
#[derive(Debug)]
pub struct Store {
	pool: SqlitePool,
	url_base: String,
}
impl Store {
	/// Open (creating if necessary) the store at `db_url` for the given wiki.
	pub async fn connect(db_url: &str, url_base: impl Into<String>) -> Result<Self> {
		let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
		let pool = sqlx::sqlite::SqlitePoolOptions::new()
			.max_connections(1)
			.connect_with(options)
			.await?;

		schema::ensure_schema(&pool).await?;

		Ok(Self { pool, url_base: url_base.into() })
	}

	/// The wiki this store instance caches.
	pub fn url_base(&self) -> &str {
		&self.url_base
	}

	/// Read the sync-cursor row, if the wiki has ever been recorded.
	pub async fn get_wiki(&self) -> Result<Option<WikiRecord>> {
		let record = sqlx::query_as::<_, WikiRecord>(
			"SELECT url_base, sync_timestamp, synced, last_update FROM wikis WHERE url_base = ?",
		)
		.bind(&self.url_base)
		.fetch_optional(&self.pool)
		.await?;

		Ok(record)
	}

	/// Upsert the sync-cursor row.
	pub async fn put_wiki(&self, wiki: &WikiRecord) -> Result<()> {
		sqlx::query(
			"INSERT INTO wikis (url_base, sync_timestamp, synced, last_update)
			 VALUES (?, ?, ?, ?)
			 ON CONFLICT(url_base) DO UPDATE SET
				sync_timestamp = excluded.sync_timestamp,
				synced = excluded.synced,
				last_update = excluded.last_update",
		)
		.bind(&self.url_base)
		.bind(wiki.sync_timestamp().map(|v| v.to_string()))
		.bind(wiki.synced)
		.bind(wiki.last_update)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	/// Point lookup of a page by title.
	pub async fn get_page(&self, title: &str) -> Result<Option<PageRecord>> {
		let record = sqlx::query_as::<_, PageRecord>(
			"SELECT title, contents, revision, last_revision FROM pages WHERE title = ?",
		)
		.bind(title)
		.fetch_optional(&self.pool)
		.await?;

		Ok(record)
	}

	/// Insert-or-update a page record.
	pub async fn upsert_page(&self, page: &PageRecord) -> Result<()> {
		sqlx::query(
			"INSERT INTO pages (title, contents, revision, last_revision)
			 VALUES (?, ?, ?, ?)
			 ON CONFLICT(title) DO UPDATE SET
				contents = excluded.contents,
				revision = excluded.revision,
				last_revision = excluded.last_revision",
		)
		.bind(&page.title)
		.bind(&page.contents)
		.bind(page.revision)
		.bind(page.last_revision)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	/// Upsert a page within an already-open transaction, for batch writers that need atomicity
	/// across several pages.
	pub async fn upsert_page_tx(
		&self,
		tx: &mut Transaction<'_, Sqlite>,
		page: &PageRecord,
	) -> Result<()> {
		sqlx::query(
			"INSERT INTO pages (title, contents, revision, last_revision)
			 VALUES (?, ?, ?, ?)
			 ON CONFLICT(title) DO UPDATE SET
				contents = excluded.contents,
				revision = excluded.revision,
				last_revision = excluded.last_revision",
		)
		.bind(&page.title)
		.bind(&page.contents)
		.bind(page.revision)
		.bind(page.last_revision)
		.execute(&mut **tx)
		.await?;

		Ok(())
	}

	/// Set `last_revision := NULL` for every known page, e.g. on a never-synced bootstrap.
	pub async fn invalidate_all(&self) -> Result<()> {
		sqlx::query("UPDATE pages SET last_revision = NULL").execute(&self.pool).await?;

		Ok(())
	}

	/// Set `last_revision := NULL` for one title, creating the row if it does not yet exist.
	pub async fn invalidate_title(&self, title: &str) -> Result<()> {
		let mut page = self.get_page(title).await?.unwrap_or_else(|| PageRecord::new(title));

		page.invalidate();

		self.upsert_page(&page).await
	}

	/// Read a page by title within an already-open transaction, so a batch of invalidations can
	/// be gathered and committed atomically.
	pub async fn get_page_tx(
		&self,
		tx: &mut Transaction<'_, Sqlite>,
		title: &str,
	) -> Result<Option<PageRecord>> {
		let record = sqlx::query_as::<_, PageRecord>(
			"SELECT title, contents, revision, last_revision FROM pages WHERE title = ?",
		)
		.bind(title)
		.fetch_optional(&mut **tx)
		.await?;

		Ok(record)
	}

	/// Invalidate one title within an already-open transaction.
	pub async fn invalidate_title_tx(
		&self,
		tx: &mut Transaction<'_, Sqlite>,
		title: &str,
	) -> Result<()> {
		let mut page = self.get_page_tx(tx, title).await?.unwrap_or_else(|| PageRecord::new(title));

		page.invalidate();

		self.upsert_page_tx(tx, &page).await
	}

	/// Pages whose content is known stale: `revision` is set but does not match `last_revision`.
	/// A page with `last_revision = NULL` (freshly invalidated) does not qualify here — it needs a
	/// metadata refetch first, per [`Store::pages_needing_metadata`].
	pub async fn pages_needing_content(&self) -> Result<Vec<PageRecord>> {
		let records = sqlx::query_as::<_, PageRecord>(
			"SELECT title, contents, revision, last_revision FROM pages
			 WHERE revision IS NOT NULL AND revision != last_revision",
		)
		.fetch_all(&self.pool)
		.await?;

		Ok(records)
	}

	/// Pages whose latest revision is unknown and must be refetched via metadata.
	pub async fn pages_needing_metadata(&self) -> Result<Vec<PageRecord>> {
		let records = sqlx::query_as::<_, PageRecord>(
			"SELECT title, contents, revision, last_revision FROM pages
			 WHERE last_revision IS NULL",
		)
		.fetch_all(&self.pool)
		.await?;

		Ok(records)
	}

	/// Begin a transaction for a batch writer that must commit several page mutations
	/// atomically.
	pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>> {
		let tx = self.pool.begin().await?;

		Ok(tx)
	}
}
