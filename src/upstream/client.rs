//! The three MediaWiki remote calls the scheduler dispatches through the rate gate.

// crates.io
use reqwest::Client;
use url::Url;
// self
use crate::{
	_prelude::*,
	upstream::{
		types::{ExportedPage, MetadataResult, PageMetadata, RecentChangesResult},
		xml,
	},
};

const MAX_METADATA_TITLES: usize = 50;
const MAX_EXPORT_TITLES: usize = 20;

/// Thin wrapper over a `reqwest::Client` bound to one wiki's API endpoint.
#[derive(Debug)]
pub struct UpstreamClient {
	http: Client,
	url_base: Url,
}
impl UpstreamClient {
	/// Build a client for the given API base URL, e.g. `https://en.wikipedia.org/w/api.php`.
	pub fn new(url_base: &str) -> Result<Self> {
		let http = Client::builder().timeout(Duration::from_secs(30)).build()?;

		Ok(Self { http, url_base: Url::parse(url_base)? })
	}

	/// Page through `list=recentchanges`, walking backward from the newest change. `rcend`, when
	/// set, stops the page at that cursor. `continuation` carries the opaque `query-continue`
	/// fragment returned by a previous call, verbatim.
	pub async fn recent_changes(
		&self,
		limit: u32,
		rcend: Option<&str>,
		continuation: Option<&serde_json::Value>,
	) -> Result<RecentChangesResult> {
		let mut request = self.http.get(self.url_base.clone()).query(&[
			("action", "query"),
			("format", "json"),
			("list", "recentchanges"),
			("rcprop", "title|user|timestamp"),
			("rcdir", "older"),
			("rclimit", &limit.to_string()),
		]);

		if let Some(rcend) = rcend {
			request = request.query(&[("rcend", rcend)]);
		}
		if let Some(continuation) = continuation
			&& let Some(map) = continuation.as_object()
		{
			for (key, value) in map {
				if let Some(value) = value.as_str() {
					request = request.query(&[(key.as_str(), value)]);
				}
			}
		}

		let response = self.send(request).await?;
		let body: serde_json::Value = response.json().await?;
		let changes = body
			.pointer("/query/recentchanges")
			.and_then(|v| v.as_array())
			.map(|entries| {
				entries
					.iter()
					.filter_map(|entry| {
						Some(crate::upstream::types::RecentChangeEntry {
							title: entry.get("title")?.as_str()?.to_owned(),
							timestamp: entry.get("timestamp")?.as_str()?.to_owned(),
							user: entry.get("user").and_then(|v| v.as_str()).unwrap_or("").to_owned(),
						})
					})
					.collect()
			})
			.unwrap_or_default();
		let continuation =
			body.get("continue").or_else(|| body.get("query-continue")).cloned();

		Ok(RecentChangesResult { changes, continuation })
	}

	/// Fetch `last_revid`/missing status for up to 50 titles in one call.
	pub async fn metadata(&self, titles: &[String]) -> Result<MetadataResult> {
		if titles.len() > MAX_METADATA_TITLES {
			return Err(Error::Validation {
				field: "titles",
				reason: format!(
					"metadata batch of {count} exceeds the limit of {MAX_METADATA_TITLES}",
					count = titles.len()
				),
			});
		}

		let joined = titles.join("|");
		let request = self.http.get(self.url_base.clone()).query(&[
			("action", "query"),
			("format", "json"),
			("prop", "revisions"),
			("rvprop", "ids"),
			("titles", joined.as_str()),
		]);
		let response = self.send(request).await?;
		let body: serde_json::Value = response.json().await?;

		if body.pointer("/query/normalized").is_some() {
			return Err(Error::UpstreamFatal {
				group: "metadata".into(),
				reason: "response contained an unexpected 'normalized' section".into(),
			});
		}

		let mut result = MetadataResult::new();

		if let Some(pages) = body.pointer("/query/pages").and_then(|v| v.as_object()) {
			for page in pages.values() {
				let Some(title) = page.get("title").and_then(|v| v.as_str()) else { continue };
				let missing = page.get("missing").is_some();
				let last_revid = page
					.get("revisions")
					.and_then(|v| v.as_array())
					.and_then(|revisions| revisions.first())
					.and_then(|revision| revision.get("revid"))
					.and_then(|v| v.as_i64());

				result.insert(title.to_owned(), PageMetadata { missing, last_revid });
			}
		}

		Ok(result)
	}

	/// Export up to 20 titles as full text via `export=1&exportnowrap=1`. Must not be given a
	/// title known to be missing; upstream errors the whole request if so.
	pub async fn export(&self, titles: &[String]) -> Result<Vec<ExportedPage>> {
		if titles.len() > MAX_EXPORT_TITLES {
			return Err(Error::Validation {
				field: "titles",
				reason: format!(
					"export batch of {count} exceeds the limit of {MAX_EXPORT_TITLES}",
					count = titles.len()
				),
			});
		}

		let joined = titles.join("|");
		let request = self.http.get(self.url_base.clone()).query(&[
			("action", "query"),
			("export", "1"),
			("exportnowrap", "1"),
			("titles", joined.as_str()),
		]);
		let response = self.send(request).await?;
		let bytes = response.bytes().await?;

		xml::parse_export(&bytes)
	}

	async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
		let response = request.send().await?;
		let status = response.status();

		if !status.is_success() {
			return Err(Error::HttpStatus { status, url: self.url_base.clone() });
		}

		Ok(response)
	}
}
