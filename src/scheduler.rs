//! The coalescing and batching scheduler: the core of this crate.
//!
//! One cooperative task owns a table of pending work grouped by API call shape. It always
//! dispatches the largest pending group first, amortizing round trips against a single
//! rate-limited upstream connection.

use std::collections::HashMap;

// crates.io
use indexmap::IndexMap;
use tokio::sync::{mpsc, oneshot};
// self
use crate::{
	_prelude::*,
	rate_gate::RateGate,
	store::{PageRecord, Store},
	sync::SyncEngine,
	upstream::UpstreamClient,
	work::{GroupKey, QueuedItem, TokenSet, powerset},
};

const METADATA_BATCH: usize = 50;
const EXPORT_BATCH: usize = 20;
const CONSECUTIVE_FAILURE_CAP: u32 = 5;

struct Submission {
	group: GroupKey,
	title: String,
	waiter: oneshot::Sender<Result<()>>,
}

/// A handle to the running scheduler loop. Clone is cheap; all clones share the same loop task.
#[derive(Clone)]
pub struct Scheduler {
	sender: mpsc::UnboundedSender<Submission>,
}
impl Scheduler {
	/// Spawn the scheduler loop as its own task.
	pub fn spawn(store: Arc<Store>, upstream: Arc<UpstreamClient>, gate: Arc<RateGate>, sync: Arc<SyncEngine>) -> Self {
		let (sender, receiver) = mpsc::unbounded_channel();

		tokio::spawn(run_loop(receiver, store, upstream, gate, sync));

		Self { sender }
	}

	/// Submit a work item and await its completion. Two submissions for the same (group, title)
	/// are coalesced: both callers receive the same outcome.
	pub async fn submit(&self, group: GroupKey, title: String) -> Result<()> {
		let (waiter, receiver) = oneshot::channel();

		self.sender
			.send(Submission { group, title, waiter })
			.map_err(|_| Error::StoreUnavailable("scheduler loop is no longer running".into()))?;

		receiver
			.await
			.map_err(|_| Error::StoreUnavailable("scheduler dropped a pending waiter".into()))?
	}
}

type Groups = IndexMap<GroupKey, IndexMap<String, QueuedItem>>;

fn insert_submission(groups: &mut Groups, submission: Submission) {
	let group = groups.entry(submission.group).or_default();

	match group.get_mut(&submission.title) {
		Some(item) => item.add_waiter(submission.waiter),
		None => {
			group.insert(submission.title, QueuedItem::new(submission.waiter));
		},
	}
}

fn prune_empty_groups(groups: &mut Groups) {
	for group in groups.values_mut() {
		group.retain(|_, item| !item.prune_closed());
	}

	groups.retain(|_, group| !group.is_empty());
}

fn largest_group(groups: &Groups) -> Option<GroupKey> {
	let mut best: Option<(&GroupKey, usize)> = None;

	for (key, items) in groups {
		let size = items.len();

		if best.is_none_or(|(_, best_size)| size > best_size) {
			best = Some((key, size));
		}
	}

	best.map(|(key, _)| key.clone())
}

async fn run_loop(
	mut receiver: mpsc::UnboundedReceiver<Submission>,
	store: Arc<Store>,
	upstream: Arc<UpstreamClient>,
	gate: Arc<RateGate>,
	sync: Arc<SyncEngine>,
) {
	let mut groups: Groups = IndexMap::new();
	let mut failures: HashMap<GroupKey, u32> = HashMap::new();

	loop {
		while let Ok(submission) = receiver.try_recv() {
			insert_submission(&mut groups, submission);
		}
		prune_empty_groups(&mut groups);

		if groups.is_empty() {
			if let Err(err) = sync.maybe_run(false).await {
				tracing::warn!(error = %err, "background sync attempt failed");
			}

			let remaining = gate.remaining().await;

			tokio::select! {
				_ = tokio::time::sleep(remaining) => {},
				submission = receiver.recv() => {
					match submission {
						Some(submission) => insert_submission(&mut groups, submission),
						None => return,
					}
				}
			}

			continue;
		}

		let remaining = gate.remaining().await;

		if remaining > Duration::ZERO {
			tokio::select! {
				_ = tokio::time::sleep(remaining) => {},
				submission = receiver.recv() => {
					match submission {
						Some(submission) => {
							insert_submission(&mut groups, submission);
							continue;
						},
						None => return,
					}
				}
			}
		}

		let Some(key) = largest_group(&groups) else { continue };

		gate.wait_then_mark().await;

		let batch = take_batch(&mut groups, &key);

		match &key {
			GroupKey::Metadata(tokens) =>
				dispatch_metadata(&mut groups, &mut failures, tokens.clone(), batch, &store, &upstream)
					.await,
			GroupKey::Export =>
				dispatch_export(&mut groups, &mut failures, batch, &store, &upstream).await,
		}
	}
}

fn take_batch(groups: &mut Groups, key: &GroupKey) -> IndexMap<String, QueuedItem> {
	let threshold = match key {
		GroupKey::Metadata(_) => METADATA_BATCH,
		GroupKey::Export => EXPORT_BATCH,
	};
	let Some(entry) = groups.get_mut(key) else { return IndexMap::new() };
	let titles: Vec<String> = entry.keys().take(threshold).cloned().collect();
	let mut batch = IndexMap::new();

	for title in titles {
		if let Some(item) = entry.shift_remove(&title) {
			batch.insert(title, item);
		}
	}

	if entry.is_empty() {
		groups.shift_remove(key);
	}

	batch
}

/// Reinsert a failed batch, or fail its waiters outright once the per-group failure cap is hit.
/// Returns true if the batch's waiters were failed (cap hit), false if it was requeued.
fn handle_batch_failure(
	groups: &mut Groups,
	failures: &mut HashMap<GroupKey, u32>,
	key: GroupKey,
	batch: IndexMap<String, QueuedItem>,
	err: &Error,
) -> bool {
	if !err.is_transient() {
		for (_, item) in batch {
			item.finish(Err(Error::UpstreamFatal {
				group: format!("{key:?}"),
				reason: err.to_string(),
			}));
		}

		failures.remove(&key);

		return true;
	}

	let count = failures.entry(key.clone()).or_insert(0);

	*count += 1;

	if *count >= CONSECUTIVE_FAILURE_CAP {
		for (_, item) in batch {
			item.finish(Err(Error::UpstreamTransient {
				group: format!("{key:?}"),
				reason: err.to_string(),
			}));
		}

		failures.remove(&key);

		true
	} else {
		let group_entry = groups.entry(key).or_default();

		for (title, item) in batch {
			group_entry.insert(title, item);
		}

		false
	}
}

async fn dispatch_metadata(
	groups: &mut Groups,
	failures: &mut HashMap<GroupKey, u32>,
	tokens: TokenSet,
	batch: IndexMap<String, QueuedItem>,
	store: &Store,
	upstream: &UpstreamClient,
) {
	let titles: Vec<String> = batch.keys().cloned().collect();
	let started = Instant::now();

	let response = match upstream.metadata(&titles).await {
		Ok(response) => response,
		Err(err) => {
			#[cfg(feature = "metrics")]
			crate::metrics::record_upstream_error(store.url_base(), "metadata");

			handle_batch_failure(groups, failures, GroupKey::Metadata(tokens), batch, &err);
			return;
		},
	};

	#[cfg(feature = "metrics")]
	crate::metrics::record_batch_dispatch(store.url_base(), "metadata", titles.len(), started.elapsed());

	failures.remove(&GroupKey::Metadata(tokens.clone()));

	let mut tx = match store.begin().await {
		Ok(tx) => tx,
		Err(err) => {
			for (_, item) in batch {
				item.finish(Err(Error::StoreUnavailable(err.to_string())));
			}

			return;
		},
	};
	let mut pending = Vec::new();

	for (title, item) in batch {
		let Some(info) = response.get(&title) else {
			// Not present in the response; retry on a later pass.
			groups.entry(GroupKey::Metadata(tokens.clone())).or_default().insert(title, item);
			continue;
		};

		let mut page = match store.get_page_tx(&mut tx, &title).await {
			Ok(page) => page.unwrap_or_else(|| PageRecord::new(&title)),
			Err(err) => {
				item.finish(Err(Error::StoreUnavailable(err.to_string())));
				continue;
			},
		};

		if info.missing {
			page.mark_absent();
		} else if let Some(last_revid) = info.last_revid {
			page.apply_metadata(last_revid);
		}

		if let Err(err) = store.upsert_page_tx(&mut tx, &page).await {
			item.finish(Err(Error::StoreUnavailable(err.to_string())));
			continue;
		}

		pending.push((title, item));
	}

	if let Err(err) = tx.commit().await {
		for (_, item) in pending {
			item.finish(Err(Error::StoreUnavailable(err.to_string())));
		}

		return;
	}

	for (title, item) in pending {
		item.finish(Ok(()));
		fan_out_metadata_subordinates(groups, &tokens, &title);
	}
}

fn fan_out_metadata_subordinates(groups: &mut Groups, tokens: &TokenSet, title: &str) {
	for subset in powerset(tokens) {
		if subset == *tokens {
			continue;
		}

		let key = GroupKey::Metadata(subset);
		let Some(sub_group) = groups.get_mut(&key) else { continue };

		if let Some(item) = sub_group.shift_remove(title) {
			item.finish(Ok(()));
		}
		if sub_group.is_empty() {
			groups.shift_remove(&key);
		}
	}
}

async fn dispatch_export(
	groups: &mut Groups,
	failures: &mut HashMap<GroupKey, u32>,
	mut batch: IndexMap<String, QueuedItem>,
	store: &Store,
	upstream: &UpstreamClient,
) {
	let titles: Vec<String> = batch.keys().cloned().collect();
	let started = Instant::now();

	let pages = match upstream.export(&titles).await {
		Ok(pages) => pages,
		Err(err) => {
			#[cfg(feature = "metrics")]
			crate::metrics::record_upstream_error(store.url_base(), "export");

			handle_batch_failure(groups, failures, GroupKey::Export, batch, &err);
			return;
		},
	};

	#[cfg(feature = "metrics")]
	crate::metrics::record_batch_dispatch(store.url_base(), "export", titles.len(), started.elapsed());

	failures.remove(&GroupKey::Export);

	let mut tx = match store.begin().await {
		Ok(tx) => tx,
		Err(err) => {
			for (_, item) in batch {
				item.finish(Err(Error::StoreUnavailable(err.to_string())));
			}

			return;
		},
	};
	let mut finished = Vec::new();

	for page in &pages {
		let Some(item) = batch.shift_remove(&page.title) else { continue };
		let mut record = match store.get_page(&page.title).await {
			Ok(record) => record.unwrap_or_else(|| PageRecord::new(&page.title)),
			Err(err) => {
				item.finish(Err(Error::StoreUnavailable(err.to_string())));
				continue;
			},
		};

		record.apply_export(page.revid, page.text.clone());

		if let Err(err) = store.upsert_page_tx(&mut tx, &record).await {
			item.finish(Err(Error::StoreUnavailable(err.to_string())));
			continue;
		}

		finished.push(item);
	}

	if let Err(err) = tx.commit().await {
		for item in finished {
			item.finish(Err(Error::StoreUnavailable(err.to_string())));
		}

		return;
	}

	for item in finished {
		item.finish(Ok(()));
	}

	// Titles present in the batch but absent from the response are retried on a later pass.
	if !batch.is_empty() {
		groups.entry(GroupKey::Export).or_default().extend(batch);
	}
}

#[cfg(test)]
mod tests {
	use wiremock::{
		Mock, MockServer, ResponseTemplate,
		matchers::{method, query_param},
	};

	use super::*;

	fn make_item() -> (QueuedItem, oneshot::Receiver<Result<()>>) {
		let (tx, rx) = oneshot::channel();

		(QueuedItem::new(tx), rx)
	}

	#[test]
	fn largest_group_prefers_earliest_on_tie() {
		let mut groups: Groups = IndexMap::new();
		let (item_a, _rx_a) = make_item();
		let (item_b, _rx_b) = make_item();

		groups.entry(GroupKey::Export).or_default().insert("A".into(), item_a);
		groups.entry(GroupKey::Metadata(TokenSet::new())).or_default().insert("B".into(), item_b);

		assert_eq!(largest_group(&groups), Some(GroupKey::Export));
	}

	#[test]
	fn largest_group_picks_bigger_group() {
		let mut groups: Groups = IndexMap::new();
		let (item_a, _rx_a) = make_item();
		let (item_b, _rx_b) = make_item();
		let (item_c, _rx_c) = make_item();

		groups.entry(GroupKey::Export).or_default().insert("A".into(), item_a);

		let metadata_group = groups.entry(GroupKey::Metadata(TokenSet::new())).or_default();
		metadata_group.insert("B".into(), item_b);
		metadata_group.insert("C".into(), item_c);

		assert_eq!(largest_group(&groups), Some(GroupKey::Metadata(TokenSet::new())));
	}

	#[tokio::test]
	async fn submit_coalesces_duplicate_titles() {
		let mut groups: Groups = IndexMap::new();
		let (tx1, rx1) = oneshot::channel();
		let (tx2, rx2) = oneshot::channel();

		insert_submission(
			&mut groups,
			Submission { group: GroupKey::Export, title: "Example".into(), waiter: tx1 },
		);
		insert_submission(
			&mut groups,
			Submission { group: GroupKey::Export, title: "Example".into(), waiter: tx2 },
		);

		assert_eq!(groups[&GroupKey::Export].len(), 1);

		let item = groups.get_mut(&GroupKey::Export).unwrap().shift_remove("Example").unwrap();
		item.finish(Ok(()));

		assert!(rx1.await.unwrap().is_ok());
		assert!(rx2.await.unwrap().is_ok());
	}

	#[test]
	fn prune_drops_groups_whose_waiters_all_closed() {
		let mut groups: Groups = IndexMap::new();
		let (tx, rx) = oneshot::channel();

		insert_submission(
			&mut groups,
			Submission { group: GroupKey::Export, title: "Example".into(), waiter: tx },
		);
		drop(rx);

		prune_empty_groups(&mut groups);

		assert!(groups.is_empty());
	}

	#[tokio::test]
	async fn dispatch_metadata_commits_whole_batch_before_signaling() {
		let server = MockServer::start().await;

		Mock::given(method("GET"))
			.and(query_param("prop", "revisions"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
				"query": {
					"pages": {
						"1": { "title": "Present", "revisions": [{ "revid": 9 }] },
						"-1": { "title": "Absent", "missing": true },
					}
				}
			})))
			.mount(&server)
			.await;

		let store = Arc::new(Store::connect("sqlite::memory:", server.uri()).await.unwrap());
		let upstream = Arc::new(UpstreamClient::new(&format!("{}/api.php", server.uri())).unwrap());
		let mut groups: Groups = IndexMap::new();
		let mut failures: HashMap<GroupKey, u32> = HashMap::new();
		let mut batch = IndexMap::new();
		let (item_present, rx_present) = make_item();
		let (item_absent, rx_absent) = make_item();

		batch.insert("Present".to_owned(), item_present);
		batch.insert("Absent".to_owned(), item_absent);

		dispatch_metadata(
			&mut groups,
			&mut failures,
			TokenSet::new(),
			batch,
			&store,
			&upstream,
		)
		.await;

		assert!(rx_present.await.unwrap().is_ok());
		assert!(rx_absent.await.unwrap().is_ok());

		let present = store.get_page("Present").await.unwrap().unwrap();
		assert_eq!(present.last_revision, Some(9));

		let absent = store.get_page("Absent").await.unwrap().unwrap();
		assert!(absent.confirmed_absent());
		assert!(absent.up_to_date());

		assert!(groups.is_empty());
	}
}
