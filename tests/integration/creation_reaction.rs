//! Creation trigger: install into contexts after their first load

use crate::integration::Browser;
use tabrelay::agent::AgentState;

#[tokio::test(start_paused = true)]
async fn test_new_context_is_installed_after_first_load() {
    let browser = Browser::new();
    let host = &browser.host;
    let w = host.open_window(true);
    let watcher = browser.orchestrator.spawn_creation_watcher();

    let id = host.spawn_context(w, "https://a.example");
    browser.settle().await;
    assert!(host.injected_scripts(id).is_empty());
    assert_eq!(host.hub().active_for(id), 1);

    host.finish_load(id);
    browser.settle().await;

    assert_eq!(host.agent_state(id), Some(AgentState::Active));
    assert_eq!(host.hub().active_for(id), 0);
    watcher.abort();
}

#[tokio::test(start_paused = true)]
async fn test_denylist_is_checked_against_the_loaded_url() {
    let browser = Browser::new();
    let host = &browser.host;
    let w = host.open_window(true);
    let watcher = browser.orchestrator.spawn_creation_watcher();

    let redirected = host.spawn_context(w, "https://start.example");
    host.navigate(redirected, "chrome://newtab");
    host.finish_load(redirected);
    let promoted = host.spawn_context(w, "chrome://newtab");
    host.navigate(promoted, "https://landing.example");
    host.finish_load(promoted);
    browser.settle().await;

    assert!(host.injected_scripts(redirected).is_empty());
    assert_eq!(host.agent_state(promoted), Some(AgentState::Active));
    watcher.abort();
}

#[tokio::test(start_paused = true)]
async fn test_later_loads_do_not_reinstall() {
    let browser = Browser::new();
    let host = &browser.host;
    host.set_auto_complete(true);
    let w = host.open_window(true);
    let watcher = browser.orchestrator.spawn_creation_watcher();

    let id = host.spawn_context(w, "https://a.example");
    browser.settle().await;
    assert_eq!(host.attempts(id, "activate"), 1);

    host.navigate(id, "https://a.example/next");
    browser.settle().await;

    assert_eq!(host.attempts(id, "activate"), 1);
    assert_eq!(host.agent_state(id), None);
    watcher.abort();
}

#[tokio::test(start_paused = true)]
async fn test_closed_before_load_releases_observer() {
    let browser = Browser::new();
    let host = &browser.host;
    let w = host.open_window(true);
    let watcher = browser.orchestrator.spawn_creation_watcher();

    let id = host.spawn_context(w, "https://a.example");
    browser.settle().await;
    assert_eq!(host.hub().active_for(id), 1);

    host.close(id);
    browser.settle().await;

    assert_eq!(host.hub().active_for(id), 0);
    assert_eq!(host.attempts(id, "activate"), 0);
    watcher.abort();
}

#[tokio::test(start_paused = true)]
async fn test_sweep_and_watcher_together_cover_old_and_new_contexts() {
    let browser = Browser::new();
    let host = &browser.host;
    host.set_auto_complete(true);
    let w = host.open_window(true);
    let existing = host.add_context(w, "https://old.example");

    let watcher = browser.orchestrator.spawn_creation_watcher();
    browser.orchestrator.on_installed().await;
    let fresh = host.spawn_context(w, "https://new.example");
    browser.settle().await;

    assert_eq!(host.delivered("activate"), vec![existing, fresh]);
    watcher.abort();
}
