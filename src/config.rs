//! Cache configuration.

// self
use crate::_prelude::*;

/// Configuration for a [`Cache`](crate::Cache) instance.
///
/// Constructed with [`CacheConfig::new`] and refined with the `with_*` builder methods, mirroring
/// the registration builders elsewhere in this crate's lineage.
#[derive(Clone, Debug)]
pub struct CacheConfig {
	url_base: String,
	db_url: Option<String>,
	force_sync: bool,
	limit: Duration,
	verbose: bool,
}
impl CacheConfig {
	/// Start building a configuration for the given MediaWiki API base URL, e.g.
	/// `https://en.wikipedia.org/w/api.php`.
	pub fn new(url_base: impl Into<String>) -> Self {
		Self {
			url_base: url_base.into(),
			db_url: None,
			force_sync: false,
			limit: Duration::from_secs(2),
			verbose: false,
		}
	}

	/// Override the persistent store location. Absent means a default local file adjacent to the
	/// running binary.
	pub fn with_db_url(mut self, db_url: impl Into<String>) -> Self {
		self.db_url = Some(db_url.into());
		self
	}

	/// Force the first sync to run unconditionally, ignoring the "synced recently" skip.
	pub fn with_force_sync(mut self, force_sync: bool) -> Self {
		self.force_sync = force_sync;
		self
	}

	/// Set the minimum interval between upstream API calls.
	pub fn with_limit(mut self, limit: Duration) -> Self {
		self.limit = limit;
		self
	}

	/// Enable verbose diagnostic logging (shifts scheduler/resolver traces from `trace` to
	/// `debug`).
	pub fn with_verbose(mut self, verbose: bool) -> Self {
		self.verbose = verbose;
		self
	}

	/// Validate the configuration, returning a field-scoped error on failure.
	pub fn validate(&self) -> Result<()> {
		if self.url_base.trim().is_empty() {
			return Err(Error::Validation {
				field: "url_base",
				reason: "must not be empty".into(),
			});
		}
		if let Some(db_url) = &self.db_url
			&& db_url.trim().is_empty()
		{
			return Err(Error::Validation {
				field: "db_url",
				reason: "must not be empty when provided".into(),
			});
		}

		Ok(())
	}

	/// The upstream MediaWiki API base URL.
	pub fn url_base(&self) -> &str {
		&self.url_base
	}

	/// The configured store location, or a default local file if none was set.
	pub fn db_url(&self) -> String {
		self.db_url.clone().unwrap_or_else(|| "sqlite://wikicache.db".into())
	}

	/// Whether the first sync should run unconditionally.
	pub fn force_sync(&self) -> bool {
		self.force_sync
	}

	/// Minimum interval between upstream API calls.
	pub fn limit(&self) -> Duration {
		self.limit
	}

	/// Whether verbose diagnostic logging is enabled.
	pub fn verbose(&self) -> bool {
		self.verbose
	}
}
