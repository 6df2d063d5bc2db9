//! Persistent, rate-limited, read-through cache for a MediaWiki instance.
//!
//! Many concurrent callers ask for page content by title; the cache coalesces duplicate
//! in-flight requests, batches peer requests that share an upstream API call shape, and
//! respects a single rate-limited connection to the wiki.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod facade;
pub mod handle;
#[cfg(feature = "metrics")] pub mod metrics;
pub mod rate_gate;
pub mod store;
pub mod sync;
pub mod title;
pub mod upstream;
pub mod work;

mod error;
mod scheduler;
mod _prelude {
	pub use std::{
		sync::Arc,
		time::{Duration, SystemTime},
	};

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}
#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	config::CacheConfig,
	error::{Error, Result},
	facade::Cache,
	handle::PageHandle,
};
