//! Denylisted contexts are never targeted, whatever the mix of URLs

use proptest::prelude::*;
use std::sync::Arc;
use tabrelay::config::TabrelayConfig;
use tabrelay::host::{Host, InMemoryHost};
use tabrelay::subscription::EventHub;
use tabrelay::types::ContextId;
use tabrelay::Orchestrator;

const PREFIXES: [&str; 3] = ["chrome://", "internal://", "127.0.0.1"];

fn url_strategy() -> impl Strategy<Value = String> {
    let scheme = prop_oneof![
        Just("https://"),
        Just("http://"),
        Just("chrome://"),
        Just("internal://"),
        Just("127.0.0.1"),
        Just("edge://"),
    ];
    (scheme, "[a-z]{1,8}(/[a-z0-9]{0,6})?").prop_map(|(scheme, rest)| format!("{}{}", scheme, rest))
}

fn denied(url: &str) -> bool {
    PREFIXES.iter().any(|prefix| url.starts_with(prefix))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Build a browser from `(window, url)` pairs; window 0 is focused.
fn populate(layout: &[(usize, String)], windows: usize) -> (InMemoryHost, Orchestrator) {
    let hub = EventHub::new();
    let host = InMemoryHost::new(hub.clone());
    let ids: Vec<_> = (0..windows).map(|i| host.open_window(i == 0)).collect();
    for (window, url) in layout {
        host.add_context(ids[window % windows], url);
    }
    let mut config = TabrelayConfig::default();
    config.relay.denylist = PREFIXES.iter().map(|p| p.to_string()).collect();
    let orchestrator = Orchestrator::new(config, Arc::new(host.clone()), hub);
    (host, orchestrator)
}

async fn url_of(host: &InMemoryHost, id: ContextId) -> String {
    host.query_contexts()
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.id == id)
        .map(|c| c.url)
        .unwrap()
}

proptest! {
    #[test]
    fn sweep_never_targets_denylisted_contexts(
        layout in prop::collection::vec((0usize..3, url_strategy()), 0..12),
    ) {
        runtime().block_on(async {
            let (host, orchestrator) = populate(&layout, 3);

            let report = orchestrator.on_installed().await;

            for record in host.send_log() {
                let url = url_of(&host, record.context_id).await;
                prop_assert!(!denied(&url), "sent {} to {}", record.tag, url);
            }
            let expected = layout.iter().filter(|(_, url)| !denied(url)).count();
            prop_assert_eq!(report.installed.len(), expected);
            prop_assert_eq!(report.skipped.len(), layout.len() - expected);
            Ok(())
        })?;
    }

    #[test]
    fn distribution_never_targets_denylisted_contexts(
        layout in prop::collection::vec((0usize..2, url_strategy()), 0..12),
    ) {
        runtime().block_on(async {
            let (host, orchestrator) = populate(&layout, 2);
            orchestrator.on_installed().await;

            let result = orchestrator
                .handle_raw(&serde_json::json!({
                    "type": "content-ready",
                    "content": "<html/>",
                    "sourceUrl": "https://source",
                    "metadata": { "title": "t", "timestamp": "2026-02-14T12:34:56.789Z" }
                }))
                .await;
            prop_assert!(result.is_success());

            let recipients = host.delivered("content-available");
            for id in &recipients {
                let context = host.context(*id).unwrap();
                prop_assert!(!denied(&context.url));
                prop_assert!(context.focused);
            }
            let expected = layout
                .iter()
                .filter(|(window, url)| window % 2 == 0 && !denied(url))
                .count();
            prop_assert_eq!(recipients.len(), expected);
            Ok(())
        })?;
    }
}
