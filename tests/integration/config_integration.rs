//! Integration tests for configuration layering

use crate::integration::{with_xdg_env, Browser};
use std::fs;
use std::time::Duration;
use tabrelay::config::{global_config_path, ConfigLoader};
use tempfile::TempDir;
use tokio::time::Instant;

fn write_global(dir: &TempDir, body: &str) {
    let path = dir.path().join("tabrelay").join("config.toml");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

#[test]
fn test_global_file_is_layered_under_explicit_file() {
    let dir = TempDir::new().unwrap();
    write_global(
        &dir,
        "[relay]\nload_timeout_ms = 5000\n\n[relay.retry]\nattempts = 5\n",
    );
    let explicit = dir.path().join("explicit.toml");
    fs::write(&explicit, "[relay.retry]\nattempts = 2\n").unwrap();

    let config = with_xdg_env(&dir, || {
        assert_eq!(
            global_config_path().unwrap(),
            dir.path().join("tabrelay").join("config.toml")
        );
        ConfigLoader::load(Some(&explicit)).unwrap()
    });

    assert_eq!(config.relay.load_timeout_ms, 5000);
    assert_eq!(config.relay.retry.attempts, 2);
    assert_eq!(config.relay.retry.delay_ms, 1000);
}

#[test]
fn test_environment_overrides_files() {
    let dir = TempDir::new().unwrap();
    write_global(&dir, "[relay]\ndenylist = [\"file://\"]\n");

    let config = with_xdg_env(&dir, || {
        std::env::set_var("TABRELAY__RELAY__DENYLIST", "about:,data:");
        std::env::set_var("TABRELAY__RELAY__RETRY__DELAY_MS", "250");
        let loaded = ConfigLoader::load(None);
        std::env::remove_var("TABRELAY__RELAY__DENYLIST");
        std::env::remove_var("TABRELAY__RELAY__RETRY__DELAY_MS");
        loaded.unwrap()
    });

    assert_eq!(config.relay.denylist, vec!["about:", "data:"]);
    assert_eq!(config.relay.retry.delay_ms, 250);
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.toml");

    let err = with_xdg_env(&dir, || ConfigLoader::load(Some(&missing)).unwrap_err());
    assert_eq!(err.kind(), "ConfigError");
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = TempDir::new().unwrap();
    let explicit = dir.path().join("bad.toml");
    fs::write(
        &explicit,
        "[relay]\ndenylist = [\"\"]\nload_timeout_ms = 0\n\n[relay.retry]\nattempts = 0\n",
    )
    .unwrap();

    let err = ConfigLoader::load_from_file(&explicit).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("attempts"));
    assert!(message.contains("load_timeout_ms"));
    assert!(message.contains("denylist"));
}

#[tokio::test(start_paused = true)]
async fn test_loaded_retry_policy_drives_the_relay() {
    let dir = TempDir::new().unwrap();
    let explicit = dir.path().join("retry.toml");
    fs::write(&explicit, "[relay.retry]\nattempts = 2\ndelay_ms = 400\n").unwrap();
    let config = ConfigLoader::load_from_file(&explicit).unwrap();

    let browser = Browser::with_config(config);
    let w = browser.host.open_window(true);
    let id = browser.host.add_context(w, "https://a.example");
    browser.orchestrator.on_installed().await;
    browser.host.fail_all_sends(id);
    let started = Instant::now();

    let result = browser.orchestrator.request_scrape("https://a.example").await;

    assert_eq!(result.kind.as_deref(), Some("TransportError"));
    assert_eq!(browser.host.attempts(id, "extract"), 2);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(400));
    assert!(elapsed < Duration::from_millis(800));
}
