//! The configured minimum interval is enforced between sequential upstream calls, including
//! between the initial sync round and the first metadata/export fetch it unblocks.

use std::time::{Duration, Instant};

use wikicache::CacheConfig;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, query_param},
};

const LIMIT: Duration = Duration::from_millis(120);

#[tokio::test]
async fn sequential_upstream_calls_are_spaced_by_the_configured_limit() {
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
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"query": { "pages": { "1": { "title": "Timed Page", "revisions": [{ "revid": 2 }] } } }
		})))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(query_param("export", "1"))
		.respond_with(ResponseTemplate::new(200).set_body_raw(
			"<mediawiki><page><title>Timed Page</title><revision><id>2</id>\
			 <text>timed contents</text></revision></page></mediawiki>",
			"text/xml",
		))
		.mount(&server)
		.await;

	let config = CacheConfig::new(format!("{}/api.php", server.uri()))
		.with_db_url("sqlite::memory:")
		.with_limit(LIMIT);
	let cache = wikicache::Cache::connect(config).await.unwrap();

	let start = Instant::now();
	let text = tokio::time::timeout(Duration::from_secs(10), cache.get("Timed Page").text())
		.await
		.expect("resolver should complete")
		.unwrap();
	let elapsed = start.elapsed();

	assert_eq!(text, "timed contents");
	// The initial sync round's `recentchanges` call, the metadata call, and the export call all
	// pass through the same gate, so resolving a single page still crosses it twice.
	assert!(
		elapsed >= LIMIT * 2,
		"expected at least two gate intervals to elapse, got {elapsed:?}"
	);
}
