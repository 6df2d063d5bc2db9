//! The single-row sync cursor for the wiki this store instance caches.

// self
use crate::_prelude::*;

/// Sync-cursor bookkeeping for one wiki.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct WikiRecord {
	/// API base URL identifying the upstream endpoint; the store's primary key.
	pub url_base: String,
	/// Opaque continuation cursor for the next sync round, serialized as JSON text. `None` means
	/// the wiki has never been synced.
	sync_timestamp: Option<String>,
	/// True once all changes up to `sync_timestamp` have been applied.
	pub synced: bool,
	/// Wall-clock time of the last successful sync attempt.
	pub last_update: Option<DateTime<Utc>>,
}
impl WikiRecord {
	/// A fresh, never-synced record for the given wiki.
	pub fn new(url_base: impl Into<String>) -> Self {
		Self { url_base: url_base.into(), sync_timestamp: None, synced: false, last_update: None }
	}

	/// The opaque sync cursor, decoded from its stored JSON form.
	pub fn sync_timestamp(&self) -> Option<serde_json::Value> {
		self.sync_timestamp.as_deref().and_then(|raw| serde_json::from_str(raw).ok())
	}

	/// Set the opaque sync cursor, encoding it to JSON for storage.
	pub fn set_sync_timestamp(&mut self, value: Option<&serde_json::Value>) {
		self.sync_timestamp = value.map(|v| v.to_string());
	}
}
