//! Command protocol between the orchestrator and the agents.
//!
//! Each direction is a closed set of tagged variants with a `type` discriminator.
//! Raw JSON is parsed through [`AgentCommand::parse`] / [`OrchestratorCommand::parse`],
//! which report unrecognised tags as [`RelayError::UnknownCommand`] instead of
//! silently falling through.

use crate::error::RelayError;
use crate::types::{now_rfc3339, ContentMetadata, ContentPayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Orchestrator -> agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentCommand {
    Activate,
    Extract,
    Acknowledge,
    ContentAvailable(ContentPayload),
}

impl AgentCommand {
    pub const TAGS: [&'static str; 4] = ["activate", "extract", "acknowledge", "content-available"];

    pub fn tag(&self) -> &'static str {
        match self {
            AgentCommand::Activate => "activate",
            AgentCommand::Extract => "extract",
            AgentCommand::Acknowledge => "acknowledge",
            AgentCommand::ContentAvailable(_) => "content-available",
        }
    }

    pub fn parse(value: &Value) -> Result<Self, RelayError> {
        parse_tagged(value, &Self::TAGS)
    }
}

/// Agent -> orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OrchestratorCommand {
    #[serde(rename_all = "camelCase")]
    ContentReady {
        content: String,
        source_url: String,
        metadata: ContentMetadata,
    },
    ScrapeRequest {
        url: String,
    },
    UrlListRequest,
}

impl OrchestratorCommand {
    pub const TAGS: [&'static str; 3] = ["content-ready", "scrape-request", "url-list-request"];

    pub fn tag(&self) -> &'static str {
        match self {
            OrchestratorCommand::ContentReady { .. } => "content-ready",
            OrchestratorCommand::ScrapeRequest { .. } => "scrape-request",
            OrchestratorCommand::UrlListRequest => "url-list-request",
        }
    }

    pub fn parse(value: &Value) -> Result<Self, RelayError> {
        parse_tagged(value, &Self::TAGS)
    }

    pub fn content_ready(payload: ContentPayload) -> Self {
        OrchestratorCommand::ContentReady {
            content: payload.content,
            source_url: payload.source_url,
            metadata: payload.metadata,
        }
    }
}

/// The discriminator of a raw command. Older agents used `action` instead of `type`.
pub fn command_tag(value: &Value) -> Option<&str> {
    value
        .get("type")
        .or_else(|| value.get("action"))
        .and_then(Value::as_str)
}

fn parse_tagged<T: serde::de::DeserializeOwned>(
    value: &Value,
    known: &[&str],
) -> Result<T, RelayError> {
    let tag = command_tag(value)
        .ok_or_else(|| RelayError::MalformedCommand("missing `type` discriminator".to_string()))?;
    if !known.contains(&tag) {
        return Err(RelayError::UnknownCommand(tag.to_string()));
    }

    let mut normalized = value.clone();
    if let Some(object) = normalized.as_object_mut() {
        if !object.contains_key("type") {
            object.insert("type".to_string(), Value::String(tag.to_string()));
        }
        object.remove("action");
    }
    serde_json::from_value(normalized)
        .map_err(|e| RelayError::MalformedCommand(format!("{}: {}", tag, e)))
}

/// Direct reply of an agent to a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "kebab-case")]
pub enum AgentReply {
    Ready,
    Content(ContentPayload),
    Acknowledged,
    Forwarded,
}

/// Structured outcome of a request handler. Errors are values, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResult {
    pub status: HandlerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Handler that produced the result
    pub context: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerStatus {
    Success,
    Error,
}

impl HandlerResult {
    pub fn success(context: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            status: HandlerStatus::Success,
            kind: None,
            message: None,
            context: context.into(),
            timestamp: now_rfc3339(),
            data,
        }
    }

    pub fn failure(context: impl Into<String>, error: &RelayError) -> Self {
        Self {
            status: HandlerStatus::Error,
            kind: Some(error.kind().to_string()),
            message: Some(error.to_string()),
            context: context.into(),
            timestamp: now_rfc3339(),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == HandlerStatus::Success
    }
}
