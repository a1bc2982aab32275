//! CLI route: single route table and run context. Dispatches to the orchestration core.

use crate::cli::parse::Commands;
use crate::config::{ConfigLoader, TabrelayConfig};
use crate::denylist::Denylist;
use crate::host::{Host, InMemoryHost};
use crate::orchestrator::Orchestrator;
use crate::protocol::OrchestratorCommand;
use crate::subscription::EventHub;
use anyhow::Context as _;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

const DEMO_ARTICLE: &str = "https://news.example/article";

/// Runtime context for CLI execution: the effective configuration.
pub struct RunContext {
    config: TabrelayConfig,
}

impl RunContext {
    /// Load configuration through `ConfigLoader`, layering `config_path` when given.
    pub fn new(config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let config = ConfigLoader::load(config_path.as_deref())
            .context("failed to load configuration")?;
        Ok(Self { config })
    }

    pub fn from_config(config: TabrelayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TabrelayConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> anyhow::Result<String> {
        match command {
            Commands::Config => {
                toml::to_string_pretty(&self.config).context("failed to render configuration")
            }
            Commands::Check { urls, format } => self.check(urls, format),
            Commands::Demo => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("failed to start async runtime")?;
                runtime.block_on(self.demo())
            }
        }
    }

    fn check(&self, urls: &[String], format: &str) -> anyhow::Result<String> {
        let denylist = Denylist::new(self.config.relay.denylist.iter().cloned());
        let verdicts: Vec<_> = urls
            .iter()
            .map(|url| (url.as_str(), denylist.matching_prefix(url)))
            .collect();

        match format {
            "json" => {
                let rows: Vec<_> = verdicts
                    .iter()
                    .map(|(url, prefix)| {
                        json!({ "url": url, "denied": prefix.is_some(), "prefix": prefix })
                    })
                    .collect();
                serde_json::to_string_pretty(&rows).context("failed to render check result")
            }
            "text" => Ok(verdicts
                .iter()
                .map(|(url, prefix)| match prefix {
                    Some(prefix) => format!("denied   {} (prefix {})", url, prefix),
                    None => format!("allowed  {}", url),
                })
                .collect::<Vec<_>>()
                .join("\n")),
            other => anyhow::bail!("unknown output format: {} (must be 'text' or 'json')", other),
        }
    }

    /// Drive the orchestrator against a small in-memory browser: a focused consumer
    /// window and a background window holding an article and an internal page.
    async fn demo(&self) -> anyhow::Result<String> {
        let hub = EventHub::new();
        let host = InMemoryHost::with_scripts(hub.clone(), self.config.injection.clone());
        host.set_auto_complete(true);

        let background = host.open_window(false);
        let consumer = host.open_window(true);
        let article = host.add_context(background, DEMO_ARTICLE);
        host.set_page(
            article,
            "Example Article",
            "<html><head><title>Example Article</title></head><body>news</body></html>",
        );
        host.add_context(background, "chrome://extensions");
        host.add_context(consumer, "https://consumer.example/app");

        let shared: Arc<dyn Host> = Arc::new(host.clone());
        let orchestrator = Arc::new(Orchestrator::new(self.config.clone(), shared, hub));
        let (inbound, requests) = mpsc::unbounded_channel();
        host.connect_orchestrator(inbound);
        let server = tokio::spawn(Arc::clone(&orchestrator).serve(requests));
        let watcher = orchestrator.spawn_creation_watcher();

        let sweep = orchestrator.on_installed().await;
        info!(installed = sweep.installed.len(), "Demo sweep complete");

        let scrape = orchestrator
            .handle(OrchestratorCommand::ScrapeRequest {
                url: DEMO_ARTICLE.to_string(),
            })
            .await;
        let urls = orchestrator.handle(OrchestratorCommand::UrlListRequest).await;
        debug!(sends = host.send_log().len(), "Demo finished");

        watcher.abort();
        server.abort();

        let report = json!({
            "sweep": sweep,
            "scrape": scrape,
            "urls": urls,
        });
        serde_json::to_string_pretty(&report).context("failed to render demo report")
    }
}
