//! Load waiter: resolves once a context reports `complete`, or times out.

use crate::error::RelayError;
use crate::registry::ContextRegistry;
use crate::subscription::{ContextSignal, EventHub};
use crate::types::{ContextId, ExecutionContext, LoadState};
use std::time::Duration;
use tracing::{debug, warn};

/// Waits for context load transitions.
///
/// Only one outstanding wait per context id is supported; callers are responsible
/// for not overlapping waits on the same id. The creation reaction follows new
/// contexts on the hub directly and never registers here, so a scrape's wait on a
/// context it just created is the only one for that id.
#[derive(Clone)]
pub struct LoadWaiter {
    hub: EventHub,
    registry: ContextRegistry,
}

impl LoadWaiter {
    pub fn new(hub: EventHub, registry: ContextRegistry) -> Self {
        Self { hub, registry }
    }

    /// Wait for `context_id` to finish loading, failing with `Timeout` after `timeout`.
    ///
    /// The observer is released on every exit path, including the timeout, so a
    /// late notification can never resolve a finished wait.
    pub async fn wait_for_load(
        &self,
        context_id: ContextId,
        timeout: Duration,
    ) -> Result<ExecutionContext, RelayError> {
        match tokio::time::timeout(timeout, self.wait_until_loaded(context_id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(context_id = %context_id, timeout_ms = timeout.as_millis() as u64, "Context load timed out");
                Err(RelayError::Timeout {
                    context_id,
                    duration: timeout,
                })
            }
        }
    }

    /// Wait without a bound.
    pub async fn wait_until_loaded(
        &self,
        context_id: ContextId,
    ) -> Result<ExecutionContext, RelayError> {
        let mut subscription = self.hub.subscribe_context(context_id);

        // The transition may have happened before the observer was registered
        match self.registry.get(context_id).await? {
            None => return Err(RelayError::ContextClosed(context_id)),
            Some(context) if context.is_loaded() => return Ok(context),
            Some(_) => {}
        }

        while let Some(signal) = subscription.recv().await {
            match signal {
                ContextSignal::Updated(update) if update.load_state == Some(LoadState::Complete) => {
                    debug!(context_id = %context_id, "Context finished loading");
                    return self
                        .registry
                        .get(context_id)
                        .await?
                        .ok_or(RelayError::ContextClosed(context_id));
                }
                ContextSignal::Updated(_) => continue,
                ContextSignal::Removed => break,
            }
        }
        Err(RelayError::ContextClosed(context_id))
    }
}
