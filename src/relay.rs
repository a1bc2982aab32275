//! Retrying relay: bounded, fixed-backoff command delivery with reply.

use crate::config::RetryPolicy;
use crate::error::{HostError, RelayError};
use crate::host::Host;
use crate::protocol::{AgentCommand, AgentReply};
use crate::types::ContextId;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Sends commands to a context, retrying transport failures.
///
/// Attempts are strictly sequential. Every host failure is treated as
/// retryable. When attempts run out, an extraction failure surfaces as
/// [`RelayError::Extraction`] and anything else as [`RelayError::Transport`].
#[derive(Clone)]
pub struct RetryingRelay {
    host: Arc<dyn Host>,
    policy: RetryPolicy,
}

impl RetryingRelay {
    pub fn new(host: Arc<dyn Host>, policy: RetryPolicy) -> Self {
        Self { host, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn send(
        &self,
        context_id: ContextId,
        command: &AgentCommand,
    ) -> Result<AgentReply, RelayError> {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            debug!(
                context_id = %context_id,
                command = command.tag(),
                attempt,
                "Relaying command"
            );
            match self.host.send(context_id, command).await {
                Ok(reply) => return Ok(reply),
                Err(err) if attempt >= attempts => {
                    warn!(
                        context_id = %context_id,
                        command = command.tag(),
                        attempts,
                        error = %err,
                        "Relay failed permanently"
                    );
                    return Err(match err {
                        HostError::ExtractionFailed { context_id, reason } => {
                            RelayError::Extraction(format!("context {}: {}", context_id, reason))
                        }
                        other => RelayError::transport(context_id, other),
                    });
                }
                Err(err) => {
                    debug!(
                        context_id = %context_id,
                        command = command.tag(),
                        attempt,
                        error = %err,
                        "Relay attempt failed; retrying"
                    );
                    sleep(self.policy.delay()).await;
                    attempt += 1;
                }
            }
        }
    }
}
