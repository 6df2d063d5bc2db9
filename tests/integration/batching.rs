//! Distinct titles requested concurrently are batched into a single metadata call and a single
//! export call rather than one round trip per title.

use std::time::Duration;

use wikicache::CacheConfig;
use wiremock::{
	Mock, MockServer, Request, ResponseTemplate,
	matchers::{method, query_param},
};

#[tokio::test]
async fn distinct_titles_are_batched_into_one_round_trip_each() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(query_param("list", "recentchanges"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"query": { "recentchanges": [] }
		})))
		.mount(&server)
		.await;

	Mock::given(method("GET"))
		.and(query_param("prop", "revisions"))
		.respond_with(|request: &Request| {
			let titles = titles_param(request);
			let pages: serde_json::Value = titles
				.iter()
				.enumerate()
				.map(|(i, title)| {
					(
						i.to_string(),
						serde_json::json!({ "title": title, "revisions": [{ "revid": 1 }] }),
					)
				})
				.collect();

			ResponseTemplate::new(200).set_body_json(serde_json::json!({ "query": { "pages": pages } }))
		})
		.expect(1)
		.mount(&server)
		.await;

	Mock::given(method("GET"))
		.and(query_param("export", "1"))
		.respond_with(|request: &Request| {
			let titles = titles_param(request);
			let body = titles
				.iter()
				.map(|title| {
					format!(
						"<page><title>{title}</title><revision><id>1</id><text>text of {title}\
						 </text></revision></page>"
					)
				})
				.collect::<String>();

			ResponseTemplate::new(200)
				.set_body_raw(format!("<mediawiki>{body}</mediawiki>"), "text/xml")
		})
		.expect(1)
		.mount(&server)
		.await;

	let config = CacheConfig::new(format!("{}/api.php", server.uri()))
		.with_db_url("sqlite::memory:")
		.with_limit(Duration::ZERO);
	let cache = wikicache::Cache::connect(config).await.unwrap();

	let handles: Vec<_> =
		["Page A", "Page B", "Page C"].iter().map(|title| cache.get(title)).collect();

	for (handle, title) in handles.iter().zip(["Page A", "Page B", "Page C"]) {
		let text = tokio::time::timeout(Duration::from_secs(5), handle.text())
			.await
			.expect("resolver should complete")
			.unwrap();

		assert_eq!(text, format!("text of {title}"));
	}
}

fn titles_param(request: &Request) -> Vec<String> {
	request
		.url
		.query_pairs()
		.find(|(key, _)| key == "titles")
		.map(|(_, value)| value.split('|').map(str::to_owned).collect())
		.unwrap_or_default()
}
