//! Orchestrator
//!
//! Top-level facade of the privileged process. Builds every component from one
//! immutable [`TabrelayConfig`], reacts to the host lifecycle triggers (install and
//! context creation), and answers inbound agent commands.
//!
//! Request handlers never raise: each one catches its error once and returns it as
//! a [`HandlerResult`] with `status: error`.

use crate::config::TabrelayConfig;
use crate::denylist::Denylist;
use crate::distribute::{ContentDistributor, DistributionReport};
use crate::error::RelayError;
use crate::host::Host;
use crate::injection::{InjectionOrchestrator, SweepReport};
use crate::load_waiter::LoadWaiter;
use crate::protocol::{HandlerResult, OrchestratorCommand};
use crate::registry::ContextRegistry;
use crate::relay::RetryingRelay;
use crate::scrape::ScrapeCoordinator;
use crate::subscription::EventHub;
use crate::types::{ContentPayload, ContextId};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Command arriving from an agent (or any other in-process caller)
#[derive(Debug)]
pub struct InboundRequest {
    /// Context the command came from, when known
    pub sender: Option<ContextId>,
    pub command: Value,
    /// Where to deliver the result; fire-and-forget when `None`
    pub reply: Option<oneshot::Sender<HandlerResult>>,
}

impl InboundRequest {
    pub fn new(command: Value) -> (Self, oneshot::Receiver<HandlerResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: None,
                command,
                reply: Some(tx),
            },
            rx,
        )
    }
}

pub struct Orchestrator {
    config: TabrelayConfig,
    registry: ContextRegistry,
    denylist: Denylist,
    injector: Arc<InjectionOrchestrator>,
    scraper: ScrapeCoordinator,
    distributor: ContentDistributor,
}

impl Orchestrator {
    pub fn new(config: TabrelayConfig, host: Arc<dyn Host>, hub: EventHub) -> Self {
        let denylist = Denylist::new(config.relay.denylist.iter().cloned());
        let registry = ContextRegistry::new(Arc::clone(&host));
        let waiter = LoadWaiter::new(hub.clone(), registry.clone());
        let relay = RetryingRelay::new(Arc::clone(&host), config.relay.retry);

        let injector = Arc::new(InjectionOrchestrator::new(
            Arc::clone(&host),
            hub,
            denylist.clone(),
            &config.injection,
        ));
        let scraper = ScrapeCoordinator::new(
            registry.clone(),
            waiter,
            relay,
            config.relay.load_timeout(),
        );
        let distributor = ContentDistributor::new(
            host,
            denylist.clone(),
            config.relay.consumer_window,
        );

        Self {
            config,
            registry,
            denylist,
            injector,
            scraper,
            distributor,
        }
    }

    pub fn config(&self) -> &TabrelayConfig {
        &self.config
    }

    pub fn injector(&self) -> &Arc<InjectionOrchestrator> {
        &self.injector
    }

    /// Install trigger: sweep every existing context.
    pub async fn on_installed(&self) -> SweepReport {
        match self.injector.sweep().await {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "Startup sweep could not list contexts");
                SweepReport::default()
            }
        }
    }

    /// Creation trigger: install into contexts as they are created.
    pub fn spawn_creation_watcher(&self) -> JoinHandle<()> {
        self.injector.watch_creations()
    }

    /// Dispatch a raw inbound command.
    pub async fn handle_raw(&self, raw: &Value) -> HandlerResult {
        match OrchestratorCommand::parse(raw) {
            Ok(command) => self.handle(command).await,
            Err(err) => {
                let tag = crate::protocol::command_tag(raw).unwrap_or("<untagged>");
                error!(command = tag, error = %err, "Rejected inbound command");
                HandlerResult::failure(format!("message handler: {}", tag), &err)
            }
        }
    }

    pub async fn handle(&self, command: OrchestratorCommand) -> HandlerResult {
        let context = command.tag();
        let outcome = match command {
            OrchestratorCommand::ContentReady {
                content,
                source_url,
                metadata,
            } => {
                let payload = ContentPayload {
                    content,
                    source_url,
                    metadata,
                };
                self.distribute(&payload).await
            }
            OrchestratorCommand::ScrapeRequest { url } => self.scrape_and_distribute(&url).await,
            OrchestratorCommand::UrlListRequest => self.list_urls().await.map(|urls| json!(urls)),
        };

        match outcome {
            Ok(data) => HandlerResult::success(context, Some(data)),
            Err(err) => {
                error!(
                    context,
                    kind = err.kind(),
                    error = %err,
                    "Request handler failed"
                );
                HandlerResult::failure(context, &err)
            }
        }
    }

    /// Scrape `url` and return the payload as a structured result.
    pub async fn request_scrape(&self, url: &str) -> HandlerResult {
        match self.scraper.request_scrape(url).await {
            Ok(payload) => HandlerResult::success("request-scrape", Some(json!(payload))),
            Err(err) => {
                error!(url, kind = err.kind(), error = %err, "Scrape failed");
                HandlerResult::failure("request-scrape", &err)
            }
        }
    }

    /// Scrape, then fan out. A failed fan-out still returns the payload, with an
    /// empty report and the distribution error alongside it.
    async fn scrape_and_distribute(&self, url: &str) -> Result<Value, RelayError> {
        let payload = self.scraper.request_scrape(url).await?;
        match self.distributor.distribute(&payload).await {
            Ok(report) => Ok(json!({ "payload": payload, "distribution": report })),
            Err(err) => {
                warn!(url, kind = err.kind(), error = %err, "Scraped content was not distributed");
                Ok(json!({
                    "payload": payload,
                    "distribution": DistributionReport::default(),
                    "distributionError": { "kind": err.kind(), "message": err.to_string() },
                }))
            }
        }
    }

    async fn distribute(&self, payload: &ContentPayload) -> Result<Value, RelayError> {
        let report: DistributionReport = self.distributor.distribute(payload).await?;
        Ok(json!(report))
    }

    /// URLs of every non-denylisted context, in snapshot order.
    pub async fn list_urls(&self) -> Result<Vec<String>, RelayError> {
        Ok(self
            .registry
            .list_all()
            .await?
            .into_iter()
            .filter(|c| self.denylist.allows(c))
            .map(|c| c.url)
            .collect())
    }

    /// Answer inbound requests until every sender is gone. Each request runs on its
    /// own task so a slow scrape never holds up the others.
    pub async fn serve(self: Arc<Self>, mut inbound: mpsc::UnboundedReceiver<InboundRequest>) {
        info!("Orchestrator accepting inbound commands");
        while let Some(request) = inbound.recv().await {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                let result = this.handle_raw(&request.command).await;
                debug!(
                    sender = ?request.sender,
                    status = ?result.status,
                    context = %result.context,
                    "Handled inbound command"
                );
                if let Some(reply) = request.reply {
                    // The caller may have stopped waiting
                    let _ = reply.send(result);
                }
            });
        }
        info!("Inbound channel closed");
    }
}
