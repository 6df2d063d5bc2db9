//! A single shared gate enforcing a minimum interval between outbound upstream calls.

// crates.io
use tokio::sync::Mutex;
// self
use crate::_prelude::*;

/// Enforces a minimum interval between calls made through [`RateGate::wait_then_mark`].
///
/// Only one caller passes through the gate at a time: the internal mutex is held across the
/// suspend-then-mark sequence, not just around the field update, so two concurrent callers never
/// both observe the gate as open at the same instant.
#[derive(Debug)]
pub struct RateGate {
	min_interval: Duration,
	next_allowed: Mutex<Instant>,
}
impl RateGate {
	/// Create a gate with the given minimum interval between calls. The gate starts open.
	pub fn new(min_interval: Duration) -> Self {
		Self { min_interval, next_allowed: Mutex::new(Instant::now()) }
	}

	/// Suspend until the gate opens, then mark the next allowed time. The mark happens
	/// unconditionally, whether or not the caller's subsequent work succeeds, so a failing
	/// upstream call cannot turn into a retry storm.
	pub async fn wait_then_mark(&self) {
		let mut next_allowed = self.next_allowed.lock().await;

		tokio::time::sleep_until(*next_allowed).await;

		*next_allowed = Instant::now() + self.min_interval;
	}

	/// Non-blocking view of how long until the gate next opens, for bounding a queue wait.
	pub async fn remaining(&self) -> Duration {
		let next_allowed = *self.next_allowed.lock().await;
		let now = Instant::now();

		if next_allowed > now { next_allowed - now } else { Duration::ZERO }
	}
}
