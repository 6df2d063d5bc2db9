//! The sync engine: applies the upstream recent-changes feed to invalidate stored revisions.
//!
//! Mirrors, step for step, the original cache's update algorithm: a never-synced wiki bootstraps
//! by discovering the newest change and invalidating everything; a synced wiki pages backward
//! through recent changes down to its stored cursor, invalidating each title it sees, and only
//! advances the cursor once the whole round has drained.

use std::{
	collections::HashSet,
	sync::atomic::{AtomicBool, Ordering},
};

// crates.io
use tokio::sync::{Mutex, Notify};
// self
use crate::{
	_prelude::*,
	rate_gate::RateGate,
	store::{Store, WikiRecord},
	title,
	upstream::UpstreamClient,
};

const REATTEMPT_SKIP_WINDOW: Duration = Duration::from_secs(300);
const RECENT_CHANGES_PAGE_LIMIT: u32 = 100;

/// Drives the recent-changes sync loop for one wiki.
pub struct SyncEngine {
	store: Arc<Store>,
	upstream: Arc<UpstreamClient>,
	gate: Arc<RateGate>,
	last_attempt: Mutex<Option<Instant>>,
	ready_flag: AtomicBool,
	ready: Notify,
}
impl SyncEngine {
	/// Construct a sync engine over the given store, upstream client, and shared rate gate.
	pub fn new(store: Arc<Store>, upstream: Arc<UpstreamClient>, gate: Arc<RateGate>) -> Arc<Self> {
		Arc::new(Self {
			store,
			upstream,
			gate,
			last_attempt: Mutex::new(None),
			ready_flag: AtomicBool::new(false),
			ready: Notify::new(),
		})
	}

	/// Wait until the first sync attempt (success or failure) has completed. Resolvers must not
	/// act before this so they do not race an empty store.
	pub async fn wait_until_ready(&self) {
		let notified = self.ready.notified();

		tokio::pin!(notified);
		notified.as_mut().enable();

		if self.ready_flag.load(Ordering::Acquire) {
			return;
		}

		notified.await;
	}

	fn mark_ready(&self) {
		if !self.ready_flag.swap(true, Ordering::AcqRel) {
			self.ready.notify_waiters();
		}
	}

	/// Run a sync round unless one finished successfully less than 5 minutes ago, unless
	/// `force_sync` is set. Always marks the ready gate on return, success or failure, so an
	/// unreachable wiki at startup cannot wedge every resolver forever.
	pub async fn maybe_run(&self, force_sync: bool) -> Result<()> {
		{
			let mut last = self.last_attempt.lock().await;

			if !force_sync
				&& let Some(previous) = *last
				&& previous.elapsed() < REATTEMPT_SKIP_WINDOW
			{
				return Ok(());
			}

			*last = Some(Instant::now());
		}

		let result = self.run_once().await;

		self.mark_ready();

		if let Err(err) = &result {
			tracing::warn!(error = %err, "sync round failed");
		}

		result
	}

	async fn run_once(&self) -> Result<()> {
		match self.store.get_wiki().await? {
			Some(wiki) if wiki.sync_timestamp().is_some() => self.advance(wiki).await,
			_ => self.bootstrap().await,
		}
	}

	/// A never-synced wiki: discover the newest change, store it as the cursor, and invalidate
	/// every known page since any of them may now be stale.
	async fn bootstrap(&self) -> Result<()> {
		self.gate.wait_then_mark().await;

		let result = self.upstream.recent_changes(1, None, None).await?;
		let newest = result.changes.first().map(|change| change.timestamp.clone());

		let mut wiki = WikiRecord::new(self.store.url_base());

		wiki.set_sync_timestamp(newest.as_deref().map(|t| serde_json::json!(t)).as_ref());
		wiki.synced = true;
		wiki.last_update = Some(Utc::now());

		self.store.put_wiki(&wiki).await?;
		self.store.invalidate_all().await?;

		tracing::debug!(?newest, "bootstrap sync complete, all known pages invalidated");

		Ok(())
	}

	/// A previously-synced wiki: page backward through recent changes down to the stored cursor,
	/// invalidating each distinct title seen, then advance the cursor to the newest timestamp
	/// observed at the start of the round. The cursor only advances once the round fully drains,
	/// so a crash mid-round simply repeats the round next time.
	async fn advance(&self, mut wiki: WikiRecord) -> Result<()> {
		let rcend = wiki.sync_timestamp().and_then(|value| value.as_str().map(str::to_owned));
		let mut newest_seen: Option<String> = None;
		let mut continuation = None;

		loop {
			self.gate.wait_then_mark().await;

			let page = self
				.upstream
				.recent_changes(RECENT_CHANGES_PAGE_LIMIT, rcend.as_deref(), continuation.as_ref())
				.await?;

			if newest_seen.is_none() {
				newest_seen = page.changes.first().map(|change| change.timestamp.clone());
			}

			let mut seen = HashSet::new();
			let mut tx = self.store.begin().await?;

			for change in &page.changes {
				let normalized = title::normalize(&change.title);

				if seen.insert(normalized.clone()) {
					self.store.invalidate_title_tx(&mut tx, &normalized).await?;
				}
			}

			tx.commit().await?;

			match page.continuation {
				Some(next) => continuation = Some(next),
				None => break,
			}
		}

		if let Some(newest) = newest_seen {
			wiki.set_sync_timestamp(Some(&serde_json::json!(newest)));
		}

		wiki.synced = true;
		wiki.last_update = Some(Utc::now());

		self.store.put_wiki(&wiki).await?;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	async fn harness() -> (Arc<Store>, Arc<UpstreamClient>, Arc<RateGate>) {
		let store =
			Arc::new(Store::connect("sqlite::memory:", "https://test.example/w/api.php").await.unwrap());
		let upstream = Arc::new(UpstreamClient::new("https://test.example/w/api.php").unwrap());
		let gate = Arc::new(RateGate::new(Duration::ZERO));

		(store, upstream, gate)
	}

	#[tokio::test]
	async fn ready_gate_releases_without_a_successful_sync() {
		let (store, upstream, gate) = harness().await;
		let sync = SyncEngine::new(store, upstream, gate);

		// No mock server is listening; the attempt fails, but the ready gate still opens.
		let _ = sync.maybe_run(true).await;

		tokio::time::timeout(Duration::from_secs(1), sync.wait_until_ready())
			.await
			.expect("ready gate should release even after a failed attempt");
	}

	#[tokio::test]
	async fn second_attempt_within_skip_window_is_a_no_op() {
		let (store, upstream, gate) = harness().await;
		let sync = SyncEngine::new(store.clone(), upstream, gate);

		let _ = sync.maybe_run(true).await;
		let wiki_after_first = store.get_wiki().await.unwrap();

		let _ = sync.maybe_run(false).await;
		let wiki_after_second = store.get_wiki().await.unwrap();

		assert_eq!(
			wiki_after_first.map(|w| w.last_update),
			wiki_after_second.map(|w| w.last_update)
		);
	}
}
