//! A sync round that reports a recent change to a cached title invalidates only that title; an
//! untouched title's cached revision survives the round.

use std::time::Duration;

use wikicache::{rate_gate::RateGate, store::PageRecord, sync::SyncEngine, upstream::UpstreamClient};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, query_param},
};

#[tokio::test]
async fn recent_change_invalidates_only_the_reported_title() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(query_param("list", "recentchanges"))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"query": {
				"recentchanges": [
					{ "title": "Stale Page", "timestamp": "2026-07-28T00:00:00Z", "user": "Someone" }
				]
			}
		})))
		.mount(&server)
		.await;

	let store =
		wikicache::store::Store::connect("sqlite::memory:", format!("{}/api.php", server.uri()))
			.await
			.unwrap();

	let mut stale = PageRecord::new("Stale Page");
	stale.apply_export(5, "old contents".into());
	store.upsert_page(&stale).await.unwrap();

	let mut untouched = PageRecord::new("Untouched Page");
	untouched.apply_export(9, "unrelated contents".into());
	store.upsert_page(&untouched).await.unwrap();

	let mut wiki = wikicache::store::WikiRecord::new(store.url_base());
	wiki.set_sync_timestamp(Some(&serde_json::json!("2026-07-01T00:00:00Z")));
	wiki.synced = true;
	store.put_wiki(&wiki).await.unwrap();

	let store = std::sync::Arc::new(store);
	let upstream =
		std::sync::Arc::new(UpstreamClient::new(format!("{}/api.php", server.uri())).unwrap());
	let gate = std::sync::Arc::new(RateGate::new(Duration::ZERO));
	let sync = SyncEngine::new(store.clone(), upstream, gate);

	sync.maybe_run(true).await.expect("sync round should succeed against the mock server");

	let stale_after = store.get_page("Stale Page").await.unwrap().unwrap();
	assert!(!stale_after.up_to_date(), "reported title must be invalidated");
	assert_eq!(stale_after.contents.as_deref(), Some("old contents"), "contents survive until re-export");

	let untouched_after = store.get_page("Untouched Page").await.unwrap().unwrap();
	assert!(untouched_after.up_to_date(), "title absent from the recent-changes feed stays current");
}
