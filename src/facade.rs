//! The public cache entry point and the per-lookup resolver task.

// self
use crate::{
	_prelude::*,
	config::CacheConfig,
	handle::{self, PageHandle, PageHandleSetter},
	rate_gate::RateGate,
	scheduler::Scheduler,
	store::{PageRecord, Store},
	sync::SyncEngine,
	title,
	upstream::UpstreamClient,
	work::{GroupKey, TokenSet},
};

/// A persistent, rate-limited, read-through cache for one MediaWiki instance.
///
/// Cloning is cheap: all clones share the same store, scheduler, and sync engine.
#[derive(Clone)]
pub struct Cache {
	store: Arc<Store>,
	scheduler: Scheduler,
	sync: Arc<SyncEngine>,
	verbose: bool,
}
impl Cache {
	/// Open (or create) the persistent store and start the background scheduler and sync engine.
	#[tracing::instrument(skip(config), fields(url_base = config.url_base()))]
	pub async fn connect(config: CacheConfig) -> Result<Self> {
		config.validate()?;

		let store = Arc::new(Store::connect(&config.db_url(), config.url_base().to_owned()).await?);
		let upstream = Arc::new(UpstreamClient::new(config.url_base())?);
		let gate = Arc::new(RateGate::new(config.limit()));
		let sync = SyncEngine::new(store.clone(), upstream.clone(), gate.clone());
		let scheduler = Scheduler::spawn(store.clone(), upstream, gate, sync.clone());
		let verbose = config.verbose();

		if config.force_sync() {
			sync.maybe_run(true).await?;
		}

		Ok(Self { store, scheduler, sync, verbose })
	}

	/// Look up a page by title, returning a handle immediately. The handle resolves once the
	/// store either confirms the cached copy is current or a fetch completes.
	pub fn get(&self, title: &str) -> PageHandle {
		self.get_with(title, false)
	}

	/// A point-in-time snapshot of this wiki's lookup/batch/error counters.
	///
	/// Backed by the same accumulator the `metrics`-crate counters update, so it is available
	/// without standing up a Prometheus scrape endpoint.
	#[cfg(feature = "metrics")]
	pub fn metrics_snapshot(&self) -> crate::metrics::WikiMetricsSnapshot {
		crate::metrics::wiki_metrics(self.store.url_base()).snapshot()
	}

	/// Like [`Cache::get`], additionally attempting to resolve a redirect to its target title
	/// first.
	///
	/// `redirect_target()` resolution needs the MediaWiki `redirects` query prop, which the
	/// current `Metadata` group key does not request; this accepts the flag but currently
	/// resolves the redirect target as the input title itself (see `DESIGN.md`).
	// TODO: thread a `redirects` prop through `GroupKey::Metadata`'s token set, then use it here.
	pub fn get_following_redirects(&self, title: &str) -> PageHandle {
		self.get_with(title, true)
	}

	fn get_with(&self, title: &str, follow_redirect: bool) -> PageHandle {
		let normalized = title::normalize(title);
		let (page_handle, setter) = handle::new_pair(normalized.clone());
		let store = self.store.clone();
		let scheduler = self.scheduler.clone();
		let sync = self.sync.clone();
		let verbose = self.verbose;

		let resolver =
			tokio::spawn(resolve(store, scheduler, sync, normalized, follow_redirect, verbose, setter));

		page_handle.attach_resolver(resolver);

		page_handle
	}
}

#[tracing::instrument(skip(store, scheduler, sync, setter), fields(%title))]
async fn resolve(
	store: Arc<Store>,
	scheduler: Scheduler,
	sync: Arc<SyncEngine>,
	title: String,
	_follow_redirect: bool,
	verbose: bool,
	setter: PageHandleSetter,
) {
	sync.wait_until_ready().await;

	#[cfg_attr(not(feature = "metrics"), allow(unused_mut))]
	let mut required_fetch = false;

	loop {
		let page = match store.get_page(&title).await {
			Ok(page) => page.unwrap_or_else(|| PageRecord::new(&title)),
			Err(err) => {
				setter.set_error(Error::StoreUnavailable(err.to_string())).await;
				return;
			},
		};

		if page.last_revision.is_none() {
			if verbose {
				tracing::debug!("submitting metadata request");
			} else {
				tracing::trace!("submitting metadata request");
			}
			required_fetch = true;

			if let Err(err) =
				scheduler.submit(GroupKey::Metadata(TokenSet::new()), title.clone()).await
			{
				setter.set_error(err).await;
				return;
			}

			continue;
		}

		if !page.up_to_date() {
			if verbose {
				tracing::debug!("submitting export request");
			} else {
				tracing::trace!("submitting export request");
			}
			required_fetch = true;

			if let Err(err) = scheduler.submit(GroupKey::Export, title.clone()).await {
				setter.set_error(err).await;
				return;
			}

			continue;
		}

		#[cfg(feature = "metrics")]
		crate::metrics::record_lookup(store.url_base(), !required_fetch);

		let value = if page.confirmed_absent() { None } else { page.contents.clone() };

		if verbose {
			tracing::debug!(found = value.is_some(), "resolved");
		} else {
			tracing::trace!(found = value.is_some(), "resolved");
		}

		setter.set_value(value).await;

		return;
	}
}
