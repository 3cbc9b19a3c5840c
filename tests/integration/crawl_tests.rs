//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a channel's paginated message list and
//! its reference pages, and run whole crawls end-to-end against it.

use channel_harvest::config::{load_config, Config};
use channel_harvest::crawler::{CrawlRequest, Orchestrator};
use channel_harvest::{CrawlMode, CrawlOutcome, DestinationLink, HarvestError};
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

const CHANNEL_PATH: &str = "/s/testchan";

/// Matches requests for the newest page, which carry no cursor
struct NoCursor;

impl Match for NoCursor {
    fn matches(&self, request: &Request) -> bool {
        request.url.query().is_none()
    }
}

/// Writes a configuration for one channel served by `server` and loads it
fn create_test_config(dir: &TempDir, server: &MockServer, mode: &str) -> Config {
    let host = url::Url::parse(&server.uri())
        .expect("Failed to parse base URL")
        .host_str()
        .expect("Failed to extract host")
        .to_string();

    let content = format!(
        r#"
[crawler]
request-delay-ms = 0
retry-delay-ms = 1
request-timeout-secs = 5
known-streak-threshold = 3

[storage]
database-path = '{db}'
checkpoint-path = '{checkpoint}'

[links]
reference-domain = "{host}"

[[channel]]
id = "testchan"
url = "{base}{channel_path}"
name = "Test Channel"
mode = "{mode}"
"#,
        db = dir.path().join("resources.db").display(),
        checkpoint = dir.path().join("crawl_state.json").display(),
        host = host,
        base = server.uri(),
        channel_path = CHANNEL_PATH,
        mode = mode,
    );

    let config_path = dir.path().join("harvest.toml");
    std::fs::write(&config_path, content).expect("Failed to write config");
    load_config(Path::new(&config_path)).expect("Failed to load config")
}

fn page(messages: &[String]) -> String {
    format!(
        "<html><body><section class=\"tgme_channel_history\">{}</section></body></html>",
        messages.join("\n")
    )
}

fn message(id: i64, body: &str, extra: &str) -> String {
    format!(
        r#"<div class="tgme_widget_message_wrap"><div class="tgme_widget_message" data-post="testchan/{id}"><div class="tgme_widget_message_text">{body}</div>{extra}</div></div>"#
    )
}

fn inline_message(id: i64) -> String {
    message(
        id,
        &format!(
            r##"名称：Resource {id}<br><a href="?q=%23drama">#drama</a><br>https://115cdn.com/s/res{id}?password=pw{id}"##
        ),
        "",
    )
}

fn deferred_message(base: &str, id: i64) -> String {
    message(
        id,
        "new upload",
        &format!(r#"<a href="{base}/Item-{id}-01-01">📎 查看资源</a>"#),
    )
}

async fn mount_page(server: &MockServer, before: Option<i64>, body: String) {
    let mock = Mock::given(method("GET")).and(path(CHANNEL_PATH));
    let mock = match before {
        Some(cursor) => mock.and(query_param("before", cursor.to_string())),
        None => mock.and(NoCursor),
    };
    mock.respond_with(
        ResponseTemplate::new(200)
            .set_body_string(body)
            .insert_header("content-type", "text/html; charset=utf-8"),
    )
    .mount(server)
    .await;
}

#[tokio::test]
async fn test_full_crawl_pages_to_the_end() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(
        &server,
        None,
        page(&[inline_message(103), inline_message(104), inline_message(105)]),
    )
    .await;
    mount_page(
        &server,
        Some(103),
        page(&[inline_message(101), inline_message(102)]),
    )
    .await;
    mount_page(&server, Some(101), page(&[])).await;

    let config = create_test_config(&dir, &server, "inline");
    let orchestrator = Orchestrator::from_config(config).expect("Failed to build orchestrator");
    let cancel = CancellationToken::new();

    let report = orchestrator
        .crawl("testchan", CrawlRequest::Full, &cancel)
        .await
        .expect("Crawl failed");

    assert_eq!(report.mode, CrawlMode::Full);
    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.saved, 5);
    assert_eq!(report.pages, 3);

    let store = orchestrator.store();
    assert_eq!(store.count("testchan").unwrap(), 5);
    assert_eq!(store.latest_message_id("testchan").unwrap(), 105);

    let resource = store.get("testchan", 102).unwrap().expect("resource 102");
    assert_eq!(resource.title, "Resource 102");
    assert_eq!(resource.tags, vec!["#drama".to_string()]);
    assert_eq!(
        resource.destination,
        DestinationLink::Found("https://115cdn.com/s/res102?password=pw102".to_string())
    );

    // A completed full crawl leaves nothing to resume
    assert!(orchestrator.pending_checkpoint().is_none());

    let hits = store.search("Resource 10", None).unwrap();
    let ids: Vec<i64> = hits.iter().map(|(_, r)| r.message_id).collect();
    assert_eq!(ids, vec![105, 104, 103, 102, 101]);
}

#[tokio::test]
async fn test_incremental_crawl_stops_at_known_messages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(
        &server,
        None,
        page(&[inline_message(201), inline_message(202), inline_message(203)]),
    )
    .await;

    let config = create_test_config(&dir, &server, "inline");
    let orchestrator = Orchestrator::from_config(config).unwrap();
    let cancel = CancellationToken::new();

    // Nothing stored yet
    let err = orchestrator
        .crawl("testchan", CrawlRequest::Incremental, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::EmptyChannel { .. }));

    let report = orchestrator
        .crawl("testchan", CrawlRequest::Limited(3), &cancel)
        .await
        .unwrap();
    assert_eq!(report.outcome, CrawlOutcome::LimitReached);
    assert_eq!(report.saved, 3);

    let report = orchestrator
        .crawl("testchan", CrawlRequest::Incremental, &cancel)
        .await
        .unwrap();
    assert_eq!(report.outcome, CrawlOutcome::CaughtUp);
    assert_eq!(report.saved, 0);
    assert_eq!(report.pages, 1);
}

#[tokio::test]
async fn test_limited_crawl_stops_on_server_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(CHANNEL_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&dir, &server, "inline");
    let orchestrator = Orchestrator::from_config(config).unwrap();

    let report = orchestrator
        .crawl("testchan", CrawlRequest::Limited(10), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, CrawlOutcome::FetchFailed);
    assert_eq!(report.saved, 0);
    assert!(orchestrator.pending_checkpoint().is_none());
}

#[tokio::test]
async fn test_deferred_sync_resolves_reference_pages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let base = server.uri();

    mount_page(
        &server,
        None,
        page(&[deferred_message(&base, 301), deferred_message(&base, 302)]),
    )
    .await;
    mount_page(&server, Some(301), page(&[])).await;

    // Only 301 has a reference page; 302 answers 404 and is marked unavailable
    Mock::given(method("GET"))
        .and(path("/Item-301-01-01"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><article><h1>Item 301</h1><p>Details</p>
               <a href="https://115cdn.com/s/ref301?password=k1">🔗 查看链接</a>
               </article></body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&dir, &server, "deferred");
    let orchestrator = Orchestrator::from_config(config).unwrap();
    let cancel = CancellationToken::new();

    let report = orchestrator
        .sync_channel("testchan", CrawlRequest::Full, &cancel)
        .await
        .unwrap();

    let crawl = report.crawl.expect("crawl report");
    assert_eq!(crawl.saved, 2);
    assert_eq!(crawl.outcome, CrawlOutcome::Completed);
    assert_eq!(report.resolve.attempted, 2);
    assert_eq!(report.resolve.found, 1);
    assert_eq!(report.resolve.failed, 1);

    let store = orchestrator.store();
    let resolved = store.get("testchan", 301).unwrap().unwrap();
    assert_eq!(resolved.title, "Item 301");
    assert_eq!(
        resolved.destination.url(),
        Some("https://115cdn.com/s/ref301?password=k1")
    );
    assert_eq!(
        store.get("testchan", 302).unwrap().unwrap().destination,
        DestinationLink::Unavailable
    );
    assert_eq!(store.count_unresolved("testchan").unwrap(), 0);

    // A second sync does not request the dead reference page again
    orchestrator
        .sync_channel("testchan", CrawlRequest::Full, &cancel)
        .await
        .unwrap();
    let dead_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/Item-302-01-01")
        .count();
    assert_eq!(dead_requests, 1);

    // Nothing to resume after a completed crawl
    let err = orchestrator
        .crawl("testchan", CrawlRequest::Resume, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::NoPendingTask { .. }));
}
