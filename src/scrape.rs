//! Scrape coordinator: resolve a URL to a context and extract its content.

use crate::error::RelayError;
use crate::load_waiter::LoadWaiter;
use crate::protocol::{AgentCommand, AgentReply};
use crate::registry::ContextRegistry;
use crate::relay::RetryingRelay;
use crate::types::{ContentPayload, ContextId};
use std::time::Duration;
use tracing::{debug, info};

pub struct ScrapeCoordinator {
    registry: ContextRegistry,
    waiter: LoadWaiter,
    relay: RetryingRelay,
    load_timeout: Duration,
}

impl ScrapeCoordinator {
    pub fn new(
        registry: ContextRegistry,
        waiter: LoadWaiter,
        relay: RetryingRelay,
        load_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            waiter,
            relay,
            load_timeout,
        }
    }

    /// Extract the content of `url`.
    ///
    /// An existing context whose URL matches exactly is reused; otherwise a new
    /// non-focused context is created and awaited before `extract` is relayed.
    /// A blank URL is rejected before any context is looked up or created.
    pub async fn request_scrape(&self, url: &str) -> Result<ContentPayload, RelayError> {
        if url.trim().is_empty() {
            return Err(RelayError::MalformedCommand(
                "scrape-request requires a non-empty url".to_string(),
            ));
        }
        let context_id = self.resolve(url).await?;

        match self.relay.send(context_id, &AgentCommand::Extract).await? {
            AgentReply::Content(payload) => {
                info!(
                    context_id = %context_id,
                    url,
                    bytes = payload.content.len(),
                    "Scrape completed"
                );
                Ok(payload)
            }
            other => Err(RelayError::Extraction(format!(
                "context {} replied {:?} instead of content",
                context_id, other
            ))),
        }
    }

    async fn resolve(&self, url: &str) -> Result<ContextId, RelayError> {
        if let Some(existing) = self.registry.find_by_url(url).await? {
            debug!(context_id = %existing.id, url, "Reusing open context");
            return Ok(existing.id);
        }

        let created = self.registry.create(url).await?;
        self.waiter
            .wait_for_load(created.id, self.load_timeout)
            .await?;
        Ok(created.id)
    }
}
