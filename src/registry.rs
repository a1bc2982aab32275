//! Context registry: point-in-time queries against the host.
//!
//! Nothing is cached. Every call goes back to the host, and callers must assume
//! the answer is stale by the time they act on it.

use crate::error::RelayError;
use crate::host::Host;
use crate::types::{ContextId, ExecutionContext, Window, WindowId};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct ContextRegistry {
    host: Arc<dyn Host>,
}

impl ContextRegistry {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }

    pub async fn list_all(&self) -> Result<Vec<ExecutionContext>, RelayError> {
        Ok(self.host.query_contexts().await?)
    }

    /// First context whose URL equals `url` exactly, in snapshot order.
    pub async fn find_by_url(&self, url: &str) -> Result<Option<ExecutionContext>, RelayError> {
        Ok(self.list_all().await?.into_iter().find(|c| c.url == url))
    }

    pub async fn get(&self, id: ContextId) -> Result<Option<ExecutionContext>, RelayError> {
        Ok(self.list_all().await?.into_iter().find(|c| c.id == id))
    }

    /// Request a new, non-focused context for `url`.
    pub async fn create(&self, url: &str) -> Result<ExecutionContext, RelayError> {
        let context = self.host.create_context(url, false).await?;
        debug!(context_id = %context.id, url, "Requested new context");
        Ok(context)
    }

    pub async fn windows(&self) -> Result<Vec<Window>, RelayError> {
        Ok(self.host.query_windows().await?)
    }

    /// The window designated by `consumer`, or the focused window when unset.
    pub async fn consumer_window(
        &self,
        consumer: Option<WindowId>,
    ) -> Result<Option<Window>, RelayError> {
        let windows = self.windows().await?;
        Ok(match consumer {
            Some(id) => windows.into_iter().find(|w| w.id == id),
            None => windows.into_iter().find(|w| w.focused),
        })
    }
}
