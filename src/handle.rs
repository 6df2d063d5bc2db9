//! The asynchronous one-shot result returned to a caller of [`Cache::get`](crate::Cache::get).
//!
//! `tokio::sync::oneshot::Receiver` can only be consumed once, but a handle may legitimately be
//! read more than once (e.g. `exists()` then `text()`). This is realized as a small cell guarded
//! by a [`tokio::sync::Mutex`] and woken with a [`tokio::sync::Notify`], the same check-then-wait
//! idiom used for the sync engine's initial-sync gate.

// std
use std::sync::Mutex as StdMutex;
// crates.io
use tokio::{
	sync::{Mutex, Notify},
	task::JoinHandle,
};
// self
use crate::_prelude::*;

#[derive(Clone, Debug)]
enum Outcome {
	Value(Option<String>),
	Failed(Arc<Error>),
}

struct Inner {
	state: Mutex<Option<Outcome>>,
	notify: Notify,
}

/// An asynchronous, multiple-read handle to a page lookup in progress.
pub struct PageHandle {
	title: String,
	inner: Arc<Inner>,
	resolver: StdMutex<Option<JoinHandle<()>>>,
}
impl PageHandle {
	/// The title this handle resolves, as passed to `get`.
	pub fn title(&self) -> &str {
		&self.title
	}

	/// Wait for, and return, the resolved contents. `None` means the page is confirmed absent
	/// upstream. Repeat calls after resolution return immediately with the same value.
	pub async fn contents(&self) -> std::result::Result<Option<String>, Arc<Error>> {
		loop {
			// Register for the next notification before checking state, closing the gap where a
			// setter could resolve the cell between our check and our wait.
			let notified = self.inner.notify.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();

			{
				let guard = self.inner.state.lock().await;

				if let Some(outcome) = guard.as_ref() {
					return match outcome.clone() {
						Outcome::Value(value) => Ok(value),
						Outcome::Failed(err) => Err(err),
					};
				}
			}

			notified.await;
		}
	}

	/// True iff the page exists upstream.
	pub async fn exists(&self) -> std::result::Result<bool, Arc<Error>> {
		self.contents().await.map(|value| value.is_some())
	}

	/// The page text, failing with [`Error::PageAbsent`] if the page does not exist upstream.
	pub async fn text(&self) -> Result<String> {
		match self.contents().await {
			Ok(Some(text)) => Ok(text),
			Ok(None) => Err(Error::PageAbsent(self.title.clone())),
			Err(err) => Err(Error::StoreUnavailable(err.to_string())),
		}
	}

	/// Abort the backing resolver task. The scheduler reclaims any work-item waiter it was
	/// suspended on the next time it prunes closed waiters.
	pub fn cancel(&self) {
		if let Ok(mut guard) = self.resolver.lock()
			&& let Some(resolver) = guard.take()
		{
			resolver.abort();
		}
	}
}

/// The resolver-side setter for a [`PageHandle`]'s cell. Never exposed outside the crate.
pub(crate) struct PageHandleSetter {
	inner: Arc<Inner>,
}
impl PageHandleSetter {
	/// Resolve the handle with a value (`None` for confirmed-absent).
	pub(crate) async fn set_value(&self, value: Option<String>) {
		*self.inner.state.lock().await = Some(Outcome::Value(value));
		self.inner.notify.notify_waiters();
	}

	/// Resolve the handle with a failure.
	pub(crate) async fn set_error(&self, err: Error) {
		*self.inner.state.lock().await = Some(Outcome::Failed(Arc::new(err)));
		self.inner.notify.notify_waiters();
	}
}

/// Construct a fresh, unresolved handle/setter pair for `title`.
pub(crate) fn new_pair(title: impl Into<String>) -> (PageHandle, PageHandleSetter) {
	let inner = Arc::new(Inner { state: Mutex::new(None), notify: Notify::new() });
	let handle =
		PageHandle { title: title.into(), inner: inner.clone(), resolver: StdMutex::new(None) };
	let setter = PageHandleSetter { inner };

	(handle, setter)
}

impl PageHandle {
	/// Attach the resolver task so [`PageHandle::cancel`] can abort it.
	pub(crate) fn attach_resolver(&self, resolver: JoinHandle<()>) {
		if let Ok(mut guard) = self.resolver.lock() {
			*guard = Some(resolver);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn contents_reads_repeat_the_same_value() {
		let (handle, setter) = new_pair("Example");
		setter.set_value(Some("hello".into())).await;

		assert_eq!(handle.contents().await.unwrap(), Some("hello".into()));
		assert_eq!(handle.contents().await.unwrap(), Some("hello".into()));
		assert!(handle.exists().await.unwrap());
	}

	#[tokio::test]
	async fn absent_page_fails_text_with_page_absent() {
		let (handle, setter) = new_pair("Missing");
		setter.set_value(None).await;

		assert!(!handle.exists().await.unwrap());
		assert!(matches!(handle.text().await, Err(Error::PageAbsent(_))));
	}

	#[tokio::test]
	async fn contents_blocks_until_resolved() {
		let (handle, setter) = new_pair("Example");
		let waiter = tokio::spawn(async move { handle.contents().await });

		tokio::task::yield_now().await;
		setter.set_value(Some("late".into())).await;

		assert_eq!(waiter.await.unwrap().unwrap(), Some("late".into()));
	}
}
