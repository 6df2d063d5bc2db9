//! Work items the scheduler coalesces and batches.

use std::collections::BTreeSet;

// crates.io
use tokio::sync::oneshot;
// self
use crate::_prelude::*;

/// Optional metadata extras a caller wants fetched alongside revision info. Always empty at
/// every current call site; the subset fan-out machinery below is kept general because a partial
/// implementation would be a latent bug for the first caller that populates one.
pub type TokenSet = BTreeSet<String>;

/// Identifies which upstream API call shape a work item needs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GroupKey {
	/// A page-metadata (`prop=revisions&info=lastrevid`) call, parameterized by the set of
	/// optional extras requested alongside it.
	Metadata(TokenSet),
	/// A page-export (`export=1&exportnowrap=1`) call.
	Export,
}
impl GroupKey {
	/// True iff `self` is a `Metadata` group whose token set is a subset of `other`'s.
	pub fn is_metadata_subset_of(&self, other: &TokenSet) -> bool {
		match self {
			Self::Metadata(tokens) => tokens.is_subset(other),
			Self::Export => false,
		}
	}
}

/// A queued, not-yet-dispatched unit of work for one coalescing key (a page title) within a
/// group. The first submitter becomes the master; later submitters for the same (group, title)
/// become subordinates whose waiter is pushed onto the same item.
#[derive(Debug, Default)]
pub struct QueuedItem {
	waiters: Vec<oneshot::Sender<Result<()>>>,
}
impl QueuedItem {
	/// Start a new queued item with its first (master) waiter.
	pub fn new(waiter: oneshot::Sender<Result<()>>) -> Self {
		Self { waiters: vec![waiter] }
	}

	/// Coalesce a subordinate waiter onto this item.
	pub fn add_waiter(&mut self, waiter: oneshot::Sender<Result<()>>) {
		self.waiters.push(waiter);
	}

	/// Drop waiters whose receiver has already gone away (the caller cancelled). Returns true if
	/// no waiters remain, meaning the whole item can be pruned.
	pub fn prune_closed(&mut self) -> bool {
		self.waiters.retain(|waiter| !waiter.is_closed());
		self.waiters.is_empty()
	}

	/// Number of live waiters, used only for diagnostics; group size for priority is the number
	/// of distinct titles, not the waiter count.
	pub fn waiter_count(&self) -> usize {
		self.waiters.len()
	}

	/// Signal every waiter (master and subordinates) with the same outcome, consuming the item.
	pub fn finish(self, outcome: Result<()>) {
		for waiter in self.waiters {
			let _ = waiter.send(clone_outcome(&outcome));
		}
	}
}

fn clone_outcome(outcome: &Result<()>) -> Result<()> {
	match outcome {
		Ok(()) => Ok(()),
		Err(err) => Err(match err {
			Error::UpstreamTransient { group, reason } =>
				Error::UpstreamTransient { group: group.clone(), reason: reason.clone() },
			Error::UpstreamFatal { group, reason } =>
				Error::UpstreamFatal { group: group.clone(), reason: reason.clone() },
			Error::StoreUnavailable(reason) => Error::StoreUnavailable(reason.clone()),
			other => Error::StoreUnavailable(other.to_string()),
		}),
	}
}

/// All subsets of `tokens`, including the empty set and `tokens` itself. Mirrors the original
/// scheduler's subset walk for fanning a metadata result out to every coalescing peer whose
/// wanted extras are a subset of what was actually fetched.
pub fn powerset(tokens: &TokenSet) -> Vec<TokenSet> {
	let items: Vec<&String> = tokens.iter().collect();
	let mut subsets = vec![TokenSet::new()];

	for item in items {
		let extended: Vec<TokenSet> = subsets
			.iter()
			.map(|subset| {
				let mut next = subset.clone();
				next.insert(item.clone());
				next
			})
			.collect();

		subsets.extend(extended);
	}

	subsets
}
