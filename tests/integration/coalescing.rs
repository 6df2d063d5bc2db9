//! Concurrent lookups of the same uncached title issue exactly one metadata call and one export
//! call between them (request coalescing).

use std::time::Duration;

use wikicache::CacheConfig;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, query_param},
};

#[tokio::test]
async fn duplicate_lookups_coalesce_into_a_single_fetch() {
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
			"query": { "pages": { "1": { "title": "Shared Page", "revisions": [{ "revid": 3 }] } } }
		})))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(query_param("export", "1"))
		.respond_with(ResponseTemplate::new(200).set_body_raw(
			"<mediawiki><page><title>Shared Page</title><revision><id>3</id>\
			 <text>shared contents</text></revision></page></mediawiki>",
			"text/xml",
		))
		.expect(1)
		.mount(&server)
		.await;

	let config = CacheConfig::new(format!("{}/api.php", server.uri()))
		.with_db_url("sqlite::memory:")
		.with_limit(Duration::ZERO);
	let cache = wikicache::Cache::connect(config).await.unwrap();

	let handles: Vec<_> = (0..5).map(|_| cache.get("Shared Page")).collect();
	let results =
		collect_texts(&handles).await.expect("every waiter resolves to the same text");

	for text in results {
		assert_eq!(text, "shared contents");
	}
}

async fn collect_texts(
	handles: &[wikicache::PageHandle],
) -> Result<Vec<String>, String> {
	let mut out = Vec::with_capacity(handles.len());

	for handle in handles {
		let text = tokio::time::timeout(Duration::from_secs(5), handle.text())
			.await
			.map_err(|_| "timed out".to_owned())?
			.map_err(|err| err.to_string())?;

		out.push(text);
	}

	Ok(out)
}
