//! Host runtime port.
//!
//! The host owns every window and execution context. The orchestrator only reads
//! snapshots and requests mutations through [`Host`]; lifecycle notifications flow
//! the other way through [`crate::subscription::EventHub`].

use crate::error::HostError;
use crate::protocol::{AgentCommand, AgentReply};
use crate::types::{ContextId, ExecutionContext, Window};
use async_trait::async_trait;

pub mod memory;

pub use memory::InMemoryHost;

/// Code injected into a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub file: String,
}

impl Script {
    pub fn new(file: impl Into<String>) -> Self {
        Self { file: file.into() }
    }
}

/// Effects the orchestrator may request from the host runtime
#[async_trait]
pub trait Host: Send + Sync {
    /// Snapshot of every live context
    async fn query_contexts(&self) -> Result<Vec<ExecutionContext>, HostError>;

    /// Snapshot of every window with its contexts
    async fn query_windows(&self) -> Result<Vec<Window>, HostError>;

    /// Open a new context for `url`; `focused` controls whether it takes focus
    async fn create_context(&self, url: &str, focused: bool) -> Result<ExecutionContext, HostError>;

    /// Install code into a context
    async fn inject(&self, context_id: ContextId, script: &Script) -> Result<(), HostError>;

    /// Deliver a command to the agent in a context and return its direct reply
    async fn send(&self, context_id: ContextId, command: &AgentCommand)
        -> Result<AgentReply, HostError>;
}
