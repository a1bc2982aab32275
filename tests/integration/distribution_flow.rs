//! Content fan-out to the consumer window

use crate::integration::Browser;
use serde_json::json;
use tabrelay::config::TabrelayConfig;
use tabrelay::types::{ContextId, WindowId};

fn content_ready(source: &str) -> serde_json::Value {
    json!({
        "type": "content-ready",
        "content": "<html>payload</html>",
        "sourceUrl": source,
        "metadata": { "title": "Payload", "timestamp": "2026-02-14T12:34:56.789Z" }
    })
}

fn ids(value: &serde_json::Value) -> Vec<ContextId> {
    serde_json::from_value(value.clone()).unwrap()
}

#[tokio::test]
async fn test_only_allowed_contexts_of_focused_window_receive_content() {
    let mut config = TabrelayConfig::default();
    config.relay.denylist = vec!["internal://".to_string()];
    let browser = Browser::with_config(config);
    let host = &browser.host;
    let other = host.open_window(false);
    let focused = host.open_window(true);
    let elsewhere = host.add_context(other, "https://elsewhere.example");
    let a = host.add_context(focused, "https://x");
    let b = host.add_context(focused, "internal://y");
    browser.orchestrator.on_installed().await;

    let result = browser
        .orchestrator
        .handle_raw(&content_ready("https://source.example"))
        .await;

    assert!(result.is_success());
    let data = result.data.unwrap();
    assert_eq!(ids(&data["delivered"]), vec![a]);
    assert_eq!(ids(&data["skipped"]), vec![b]);
    assert_eq!(host.delivered("content-available"), vec![a]);
    assert_eq!(host.attempts(elsewhere, "content-available"), 0);
    assert_eq!(host.attempts(b, "content-available"), 0);
}

#[tokio::test]
async fn test_one_failing_recipient_of_three() {
    let browser = Browser::new();
    let host = &browser.host;
    let w = host.open_window(true);
    let first = host.add_context(w, "https://1.example");
    let broken = host.add_context(w, "https://2.example");
    let third = host.add_context(w, "https://3.example");
    browser.orchestrator.on_installed().await;
    host.fail_all_sends(broken);

    let result = browser
        .orchestrator
        .handle_raw(&content_ready("https://source.example"))
        .await;

    assert!(result.is_success());
    let data = result.data.unwrap();
    assert_eq!(ids(&data["delivered"]), vec![first, third]);
    assert_eq!(ids(&data["failed"]), vec![broken]);
    // Fan-out makes a single attempt per recipient
    assert_eq!(host.attempts(broken, "content-available"), 1);
}

#[tokio::test]
async fn test_no_focused_window_is_a_successful_no_op() {
    let browser = Browser::new();
    let host = &browser.host;
    let w = host.open_window(false);
    host.add_context(w, "https://a.example");
    browser.orchestrator.on_installed().await;

    let result = browser
        .orchestrator
        .handle_raw(&content_ready("https://source.example"))
        .await;

    assert!(result.is_success());
    assert!(host.delivered("content-available").is_empty());
}

#[tokio::test]
async fn test_pinned_consumer_window_ignores_focus() {
    let pinned = WindowId(1);
    let mut config = TabrelayConfig::default();
    config.relay.consumer_window = Some(pinned);
    let browser = Browser::with_config(config);
    let host = &browser.host;
    let consumer_window = host.open_window(false);
    let focused = host.open_window(true);
    let consumer = host.add_context(consumer_window, "https://consumer.example");
    let bystander = host.add_context(focused, "https://other.example");
    browser.orchestrator.on_installed().await;

    let result = browser
        .orchestrator
        .handle_raw(&content_ready("https://source.example"))
        .await;

    assert!(result.is_success());
    assert_eq!(consumer_window, pinned);
    assert_eq!(host.delivered("content-available"), vec![consumer]);
    assert_eq!(host.attempts(bystander, "content-available"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_agent_pushed_content_reaches_consumer_agents() {
    let browser = Browser::new();
    let host = &browser.host;
    let background = host.open_window(false);
    let focused = host.open_window(true);
    let source = host.add_context(background, "https://source.example");
    host.set_page(source, "Source", "<html>pushed</html>");
    let reader = host.add_context(focused, "https://reader.example");
    let internal = host.add_context(focused, "chrome://history");
    browser.orchestrator.on_installed().await;
    let mut events = host.subscribe_agent(reader).unwrap();

    assert!(host.push_content(source));
    browser.settle().await;

    assert_eq!(host.delivered("content-available"), vec![reader]);
    assert_eq!(host.attempts(internal, "content-available"), 0);
    let event = events.recv().await.unwrap();
    assert_eq!(event.detail["content"], "<html>pushed</html>");
    assert_eq!(event.detail["metadata"]["title"], "Source");
}
