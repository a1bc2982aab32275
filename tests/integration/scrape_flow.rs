//! Scrape requests: reuse, creation, load timeout and agent-initiated requests

use crate::integration::Browser;
use serde_json::{json, Value};
use std::time::Duration;
use tabrelay::host::Host;
use tabrelay::protocol::{HandlerStatus, OrchestratorCommand};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_scrape_reuses_open_context() {
    let browser = Browser::new();
    let host = &browser.host;
    let w = host.open_window(true);
    let id = host.add_context(w, "https://known.example");
    host.set_page(id, "Known", "<html>known</html>");
    browser.orchestrator.on_installed().await;

    let result = browser.orchestrator.request_scrape("https://known.example").await;

    assert!(result.is_success());
    let data = result.data.unwrap();
    assert_eq!(data["content"], "<html>known</html>");
    assert_eq!(data["sourceUrl"], "https://known.example");
    assert_eq!(data["metadata"]["title"], "Known");
    assert_eq!(host.context_count(), 1);
    assert_eq!(host.attempts(id, "extract"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scrape_creates_one_context_and_waits_for_install() {
    let browser = Browser::new();
    let host = &browser.host;
    host.set_auto_complete(true);
    host.open_window(true);
    let watcher = browser.orchestrator.spawn_creation_watcher();

    let result = browser.orchestrator.request_scrape("https://fresh.example").await;

    assert!(result.is_success(), "scrape failed: {:?}", result.message);
    let contexts = host.query_contexts().await.unwrap();
    assert_eq!(contexts.len(), 1);
    let created = contexts[0].id;
    assert_eq!(contexts[0].url, "https://fresh.example");
    let extracts = host.attempts(created, "extract");
    assert!((1..=3).contains(&extracts));
    watcher.abort();
}

#[tokio::test(start_paused = true)]
async fn test_scrape_of_never_loading_context_times_out() {
    let browser = Browser::new();
    let host = &browser.host;
    host.open_window(true);
    let started = Instant::now();

    let result = browser
        .orchestrator
        .handle(OrchestratorCommand::ScrapeRequest {
            url: "https://new.example".to_string(),
        })
        .await;

    let elapsed = started.elapsed();
    assert_eq!(result.status, HandlerStatus::Error);
    assert_eq!(result.kind.as_deref(), Some("TimeoutError"));
    assert_eq!(result.context, "scrape-request");
    assert!(elapsed >= Duration::from_millis(30_000));
    assert!(elapsed < Duration::from_millis(30_100));
    assert_eq!(host.context_count(), 1);
    assert_eq!(host.hub().active_count(), 0);
    assert!(host.send_log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scrape_surfaces_extraction_error_after_retries() {
    let browser = Browser::new();
    let host = &browser.host;
    let w = host.open_window(true);
    let id = host.add_context(w, "https://broken.example");
    browser.orchestrator.on_installed().await;
    host.fail_extraction(id);
    let started = Instant::now();

    let result = browser.orchestrator.request_scrape("https://broken.example").await;

    assert_eq!(result.kind.as_deref(), Some("ExtractionError"));
    assert!(result
        .message
        .as_deref()
        .unwrap_or_default()
        .contains("document is not serializable"));
    assert_eq!(host.attempts(id, "extract"), 3);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(2000));
    assert!(elapsed < Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn test_agent_scrape_request_delivers_content_to_consumer() {
    let browser = Browser::new();
    let host = &browser.host;
    let background = host.open_window(false);
    let consumer_window = host.open_window(true);
    let article = host.add_context(background, "https://news.example/a");
    host.set_page(article, "Article", "<html>story</html>");
    let consumer = host.add_context(consumer_window, "https://consumer.example");
    browser.orchestrator.on_installed().await;
    let mut events = host.subscribe_agent(consumer).unwrap();

    assert!(host.page_event(
        consumer,
        "scrape-request",
        json!({ "url": "https://news.example/a" })
    ));
    browser.settle().await;

    assert_eq!(host.delivered("extract"), vec![article]);
    assert_eq!(host.delivered("content-available"), vec![consumer]);
    let event = events.recv().await.unwrap();
    assert_eq!(event.name, "content-available");
    assert_eq!(event.detail["content"], "<html>story</html>");
    assert_eq!(event.detail["sourceUrl"], "https://news.example/a");
}

#[tokio::test(start_paused = true)]
async fn test_agent_scrape_request_without_url_creates_no_context() {
    let browser = Browser::new();
    let host = &browser.host;
    let w = host.open_window(true);
    let consumer = host.add_context(w, "https://consumer.example");
    browser.orchestrator.on_installed().await;

    assert!(!host.page_event(consumer, "scrape-request", Value::Null));
    assert!(!host.page_event(consumer, "scrape-request", json!({ "url": "" })));
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(host.context_count(), 1);
    let urls = browser.orchestrator.list_urls().await.unwrap();
    assert_eq!(urls, vec!["https://consumer.example".to_string()]);
    assert!(host.delivered("extract").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_blank_scrape_request_is_rejected_before_resolving() {
    let browser = Browser::new();
    let host = &browser.host;
    host.open_window(true);
    let started = Instant::now();

    let result = browser
        .orchestrator
        .handle_raw(&json!({ "type": "scrape-request", "url": "" }))
        .await;

    assert_eq!(result.status, HandlerStatus::Error);
    assert_eq!(result.kind.as_deref(), Some("MalformedCommandError"));
    assert_eq!(result.context, "scrape-request");
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(host.context_count(), 0);
    assert_eq!(host.hub().active_count(), 0);
}
