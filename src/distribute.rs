//! Content distributor: best-effort fan-out of extracted content to the consumer window.

use crate::denylist::Denylist;
use crate::error::RelayError;
use crate::host::Host;
use crate::protocol::AgentCommand;
use crate::registry::ContextRegistry;
use crate::types::{now_rfc3339, ContentPayload, ContextId, ExecutionContext, WindowId};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-recipient outcome of one distribution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DistributionReport {
    pub window_id: Option<WindowId>,
    pub delivered: Vec<ContextId>,
    pub skipped: Vec<ContextId>,
    pub failed: Vec<ContextId>,
}

pub struct ContentDistributor {
    host: Arc<dyn Host>,
    registry: ContextRegistry,
    denylist: Denylist,
    consumer: Option<WindowId>,
}

impl ContentDistributor {
    /// `consumer` pins the receiving window; `None` follows window focus.
    pub fn new(host: Arc<dyn Host>, denylist: Denylist, consumer: Option<WindowId>) -> Self {
        let registry = ContextRegistry::new(Arc::clone(&host));
        Self {
            host,
            registry,
            denylist,
            consumer,
        }
    }

    /// Send `content-available` to every eligible context of the consumer window.
    ///
    /// Individual delivery failures are logged and recorded; they never stop the
    /// remaining deliveries. Only failing to query the windows is an error.
    pub async fn distribute(
        &self,
        payload: &ContentPayload,
    ) -> Result<DistributionReport, RelayError> {
        let Some(window) = self.registry.consumer_window(self.consumer).await? else {
            debug!("No consumer window; nothing to distribute");
            return Ok(DistributionReport::default());
        };

        let (recipients, denied): (Vec<ExecutionContext>, Vec<ExecutionContext>) = window
            .contexts
            .into_iter()
            .partition(|context| self.denylist.allows(context));

        let mut report = DistributionReport {
            window_id: Some(window.id),
            skipped: denied.iter().map(|c| c.id).collect(),
            ..DistributionReport::default()
        };

        let command = AgentCommand::ContentAvailable(payload.clone());
        let results = join_all(recipients.iter().map(|recipient| {
            let command = &command;
            async move { (recipient.id, self.host.send(recipient.id, command).await) }
        }))
        .await;

        for (context_id, result) in results {
            match result {
                Ok(_) => report.delivered.push(context_id),
                Err(err) => {
                    warn!(
                        context_id = %context_id,
                        stage = "content-available",
                        timestamp = %now_rfc3339(),
                        error = %err,
                        "Failed to deliver content"
                    );
                    report.failed.push(context_id);
                }
            }
        }

        info!(
            window_id = %window.id,
            source_url = %payload.source_url,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Distributed content"
        );
        Ok(report)
    }
}
