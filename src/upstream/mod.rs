//! The upstream MediaWiki API surface: three idempotent remote calls reached through `reqwest`.

mod client;
mod types;
mod xml;

pub use client::UpstreamClient;
pub use types::{ExportedPage, MetadataResult, PageMetadata, RecentChangeEntry, RecentChangesResult};
