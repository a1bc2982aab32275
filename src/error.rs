//! Error types for the tabrelay orchestration core.

use crate::types::ContextId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by the host runtime port
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("Context not found: {0}")]
    ContextNotFound(ContextId),

    #[error("Agent not installed in context {0}")]
    AgentNotInstalled(ContextId),

    #[error("Agent exception in context {context_id}: {message}")]
    AgentException {
        context_id: ContextId,
        message: String,
    },

    #[error("Content extraction failed in context {context_id}: {reason}")]
    ExtractionFailed {
        context_id: ContextId,
        reason: String,
    },

    #[error("Script injection failed in context {context_id}: {reason}")]
    InjectionFailed {
        context_id: ContextId,
        reason: String,
    },

    #[error("Host query failed: {0}")]
    QueryFailed(String),
}

/// Step of the per-context install pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    RuntimeShim,
    CapabilityAgent,
    Activation,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallStage::RuntimeShim => "runtime-shim",
            InstallStage::CapabilityAgent => "capability-agent",
            InstallStage::Activation => "activation",
        };
        f.write_str(name)
    }
}

/// Orchestration errors
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    #[error("Transport to context {context_id} failed: {source}")]
    Transport {
        context_id: ContextId,
        #[source]
        source: HostError,
    },

    #[error("Context {context_id} did not finish loading within {duration:?}")]
    Timeout {
        context_id: ContextId,
        duration: Duration,
    },

    #[error("Unknown command type: {0}")]
    UnknownCommand(String),

    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Install failed for context {context_id} at {stage}: {reason}")]
    Injection {
        context_id: ContextId,
        stage: InstallStage,
        reason: String,
    },

    #[error("Context {0} no longer exists")]
    ContextClosed(ContextId),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    pub fn transport(context_id: ContextId, source: HostError) -> Self {
        RelayError::Transport { context_id, source }
    }

    /// Taxonomy class reported in structured handler results.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Transport { .. } => "TransportError",
            RelayError::Timeout { .. } => "TimeoutError",
            RelayError::UnknownCommand(_) => "UnknownCommandError",
            RelayError::MalformedCommand(_) => "MalformedCommandError",
            RelayError::Extraction(_) => "ExtractionError",
            RelayError::Injection { .. } => "InjectionError",
            RelayError::ContextClosed(_) => "ContextClosedError",
            RelayError::Host(_) => "HostError",
            RelayError::Config(_) => "ConfigError",
        }
    }
}

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        RelayError::Config(err.to_string())
    }
}
