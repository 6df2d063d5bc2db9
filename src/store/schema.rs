//! Schema creation. No migration framework is introduced; tables are created on first connect.

// crates.io
use sqlx::SqlitePool;
// self
use crate::_prelude::*;

pub(super) async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
	sqlx::query(
		"CREATE TABLE IF NOT EXISTS wikis (
			url_base TEXT PRIMARY KEY NOT NULL,
			sync_timestamp TEXT,
			synced INTEGER NOT NULL,
			last_update TEXT
		)",
	)
	.execute(pool)
	.await?;

	sqlx::query(
		"CREATE TABLE IF NOT EXISTS pages (
			title TEXT PRIMARY KEY NOT NULL,
			contents TEXT,
			revision INTEGER,
			last_revision INTEGER
		)",
	)
	.execute(pool)
	.await?;

	Ok(())
}
