//! Metrics helpers and per-wiki telemetry bookkeeping.

// std
use std::{
	collections::HashMap,
	sync::{
		Mutex as StdMutex, OnceLock,
		atomic::{AtomicU64, Ordering},
	},
};
// crates.io
use metrics::Label;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use smallvec::SmallVec;
// self
use crate::_prelude::*;

type LabelSet = SmallVec<[Label; 4]>;

const METRIC_LOOKUPS_TOTAL: &str = "wikicache_lookups_total";
const METRIC_HITS_TOTAL: &str = "wikicache_hits_total";
const METRIC_MISSES_TOTAL: &str = "wikicache_misses_total";
const METRIC_BATCH_DISPATCH_TOTAL: &str = "wikicache_batch_dispatch_total";
const METRIC_BATCH_SIZE: &str = "wikicache_batch_size";
const METRIC_UPSTREAM_DURATION: &str = "wikicache_upstream_duration_seconds";
const METRIC_UPSTREAM_ERRORS: &str = "wikicache_upstream_errors_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe metrics accumulator for a single wiki.
#[derive(Debug, Default)]
pub struct WikiMetrics {
	total_lookups: AtomicU64,
	cache_hits: AtomicU64,
	cache_misses: AtomicU64,
	batch_dispatches: AtomicU64,
	upstream_errors: AtomicU64,
	last_upstream_micros: AtomicU64,
}
impl WikiMetrics {
	/// Create a new metrics accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a lookup that the store already satisfied without an upstream call.
	pub fn record_hit(&self) {
		self.total_lookups.fetch_add(1, Ordering::Relaxed);
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a lookup that required at least one upstream call.
	pub fn record_miss(&self) {
		self.total_lookups.fetch_add(1, Ordering::Relaxed);
		self.cache_misses.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a batch dispatch and the upstream call's latency.
	pub fn record_batch_dispatch(&self, duration: Duration) {
		self.batch_dispatches.fetch_add(1, Ordering::Relaxed);
		self.last_upstream_micros.store(duration.as_micros() as u64, Ordering::Relaxed);
	}

	/// Record an upstream call failure.
	pub fn record_upstream_error(&self) {
		self.upstream_errors.fetch_add(1, Ordering::Relaxed);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> WikiMetricsSnapshot {
		WikiMetricsSnapshot {
			total_lookups: self.total_lookups.load(Ordering::Relaxed),
			cache_hits: self.cache_hits.load(Ordering::Relaxed),
			cache_misses: self.cache_misses.load(Ordering::Relaxed),
			batch_dispatches: self.batch_dispatches.load(Ordering::Relaxed),
			upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
			last_upstream_micros: match self.last_upstream_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}
}

/// Read-only snapshot of per-wiki telemetry counters.
#[derive(Clone, Debug)]
pub struct WikiMetricsSnapshot {
	/// Total number of `get` lookups observed.
	pub total_lookups: u64,
	/// Count of lookups satisfied without an upstream call.
	pub cache_hits: u64,
	/// Count of lookups that required at least one upstream call.
	pub cache_misses: u64,
	/// Count of batches dispatched to the upstream API.
	pub batch_dispatches: u64,
	/// Count of upstream call failures.
	pub upstream_errors: u64,
	/// Microsecond latency of the most recent batch dispatch.
	pub last_upstream_micros: Option<u64>,
}
impl WikiMetricsSnapshot {
	/// Convenience method to compute the cache hit rate.
	pub fn hit_rate(&self) -> f64 {
		if self.total_lookups == 0 {
			0.0
		} else {
			self.cache_hits as f64 / self.total_lookups as f64
		}
	}
}

/// Process-wide registry of per-wiki accumulators, keyed by `url_base`. The global `metrics`
/// crate counters (below) are what a Prometheus scrape reads; this registry backs the in-process
/// [`crate::Cache::metrics_snapshot`] accessor for callers that just want a quick number without
/// standing up a scrape endpoint.
static WIKI_METRICS: OnceLock<StdMutex<HashMap<String, Arc<WikiMetrics>>>> = OnceLock::new();

/// Get or create the [`WikiMetrics`] accumulator for a wiki.
pub(crate) fn wiki_metrics(wiki: &str) -> Arc<WikiMetrics> {
	let registry = WIKI_METRICS.get_or_init(|| StdMutex::new(HashMap::new()));
	let mut guard = registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

	guard.entry(wiki.to_owned()).or_insert_with(WikiMetrics::new).clone()
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record a lookup outcome for a wiki.
pub fn record_lookup(wiki: &str, hit: bool) {
	let labels = base_labels(wiki);

	metrics::counter!(METRIC_LOOKUPS_TOTAL, labels.iter()).increment(1);

	if hit {
		metrics::counter!(METRIC_HITS_TOTAL, labels.iter()).increment(1);
		wiki_metrics(wiki).record_hit();
	} else {
		metrics::counter!(METRIC_MISSES_TOTAL, labels.iter()).increment(1);
		wiki_metrics(wiki).record_miss();
	}
}

/// Record a batch dispatch for a wiki's group (`"metadata"` or `"export"`) along with its size
/// and the upstream call's latency.
pub fn record_batch_dispatch(wiki: &str, group: &'static str, size: usize, duration: Duration) {
	let labels = group_labels(wiki, group);

	metrics::counter!(METRIC_BATCH_DISPATCH_TOTAL, labels.iter()).increment(1);
	metrics::histogram!(METRIC_BATCH_SIZE, labels.iter()).record(size as f64);
	metrics::histogram!(METRIC_UPSTREAM_DURATION, labels.iter()).record(duration.as_secs_f64());
	wiki_metrics(wiki).record_batch_dispatch(duration);
}

/// Record an upstream call failure for a wiki's group.
pub fn record_upstream_error(wiki: &str, group: &'static str) {
	metrics::counter!(METRIC_UPSTREAM_ERRORS, group_labels(wiki, group).iter()).increment(1);
	wiki_metrics(wiki).record_upstream_error();
}

fn base_labels(wiki: &str) -> LabelSet {
	let mut labels = LabelSet::with_capacity(1);

	labels.push(Label::new("wiki", wiki.to_owned()));

	labels
}

fn group_labels(wiki: &str, group: &'static str) -> LabelSet {
	let mut labels = base_labels(wiki);

	labels.push(Label::new("group", group));

	labels
}
