//! Install trigger: sweep over the contexts that exist at startup

use crate::integration::Browser;
use tabrelay::agent::AgentState;
use tabrelay::config::TabrelayConfig;
use tabrelay::host::Host;
use tabrelay::protocol::{AgentCommand, AgentReply};

#[tokio::test]
async fn test_sweep_installs_into_every_allowed_context() {
    let browser = Browser::new();
    let host = &browser.host;
    let first = host.open_window(false);
    let second = host.open_window(true);
    let a = host.add_context(first, "https://a.example");
    let settings = host.add_context(first, "chrome://settings");
    let b = host.add_context(second, "https://b.example");
    let flags = host.add_context(second, "edge://flags");
    let local = host.add_context(second, "127.0.0.1:3000/");

    let report = browser.orchestrator.on_installed().await;

    assert_eq!(report.installed, vec![a, b]);
    assert_eq!(report.skipped, vec![settings, flags, local]);
    assert!(report.failed.is_empty());
    for id in [a, b] {
        assert_eq!(
            host.injected_scripts(id),
            vec!["browser-polyfill.js".to_string(), "content.js".to_string()]
        );
        assert_eq!(host.agent_state(id), Some(AgentState::Active));
    }
    for id in [settings, flags, local] {
        assert!(host.injected_scripts(id).is_empty());
        assert_eq!(host.attempts(id, "activate"), 0);
    }
}

#[tokio::test]
async fn test_sweep_isolates_per_context_failures() {
    let browser = Browser::new();
    let host = &browser.host;
    let w = host.open_window(true);
    let a = host.add_context(w, "https://a.example");
    let shim_rejected = host.add_context(w, "https://b.example");
    let no_receiver = host.add_context(w, "https://c.example");
    let d = host.add_context(w, "https://d.example");
    host.fail_injection(shim_rejected, "browser-polyfill.js");
    host.fail_all_sends(no_receiver);

    let report = browser.orchestrator.on_installed().await;

    assert_eq!(report.installed, vec![a, d]);
    let failed: Vec<_> = report.failed.iter().map(|f| f.context_id).collect();
    assert_eq!(failed, vec![shim_rejected, no_receiver]);
    assert!(report.failed[0].error.contains("runtime-shim"));
    assert!(report.failed[1].error.contains("activation"));
    // Activation is not retried during install
    assert_eq!(host.attempts(no_receiver, "activate"), 1);
}

#[tokio::test]
async fn test_sweep_uses_configured_script_names() {
    let mut config = TabrelayConfig::default();
    config.injection.runtime_shim = "shim.js".to_string();
    config.injection.capability_agent = "agent.js".to_string();
    let browser = Browser::with_config(config);
    let w = browser.host.open_window(true);
    let id = browser.host.add_context(w, "https://a.example");

    let report = browser.orchestrator.on_installed().await;

    assert_eq!(report.installed, vec![id]);
    assert_eq!(
        browser.host.injected_scripts(id),
        vec!["shim.js".to_string(), "agent.js".to_string()]
    );
}

#[tokio::test]
async fn test_installed_agent_answers_extract() {
    let browser = Browser::new();
    let w = browser.host.open_window(true);
    let id = browser.host.add_context(w, "https://a.example");
    browser.host.set_page(id, "A", "<html>a</html>");
    browser.orchestrator.on_installed().await;

    match browser.host.send(id, &AgentCommand::Extract).await.unwrap() {
        AgentReply::Content(payload) => {
            assert_eq!(payload.content, "<html>a</html>");
            assert_eq!(payload.source_url, "https://a.example");
            assert_eq!(payload.metadata.title, "A");
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}
