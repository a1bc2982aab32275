//! Agent
//!
//! Minimal responder living inside each execution context. It starts
//! uninitialized, becomes active on `activate`, and then answers the
//! orchestrator's commands:
//!
//! - `extract`: runs the page [`Extractor`] and returns the payload as the direct reply
//! - `acknowledge`: announces `acknowledge-success` locally
//! - anything else: re-broadcast as a local notification named after the command tag
//!
//! While active it also listens for page events and forwards scrape and URL-list
//! requests to the orchestrator through its outbox. Nothing survives a reload;
//! the host builds a fresh agent whenever the context navigates.

use crate::protocol::{command_tag, AgentCommand, AgentReply, OrchestratorCommand};
use crate::types::{now_rfc3339, ContentPayload};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

pub const READY_EVENT: &str = "ready";
pub const ACKNOWLEDGED_EVENT: &str = "acknowledge-success";

const LOCAL_EVENT_CAPACITY: usize = 64;

/// Raw page content produced by the extraction routine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    pub html: String,
    pub url: String,
    pub title: String,
}

/// Serializes the page the agent lives in.
pub trait Extractor: Send + Sync {
    fn extract(&self) -> Result<PageSnapshot, String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("agent is not active")]
    NotActive,

    #[error("content extraction failed: {0}")]
    Extraction(String),

    #[error("orchestrator channel closed")]
    OutboxClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Uninitialized,
    Active,
}

/// Page events the agent reacts to once active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageListener {
    ScrapeRequest,
    UrlListRequest,
    Acknowledge,
}

impl PageListener {
    const ALL: [PageListener; 3] = [
        PageListener::ScrapeRequest,
        PageListener::UrlListRequest,
        PageListener::Acknowledge,
    ];

    pub fn event_name(self) -> &'static str {
        match self {
            PageListener::ScrapeRequest => "scrape-request",
            PageListener::UrlListRequest => "url-list-request",
            PageListener::Acknowledge => "acknowledge",
        }
    }

    fn from_event_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.event_name() == name)
    }
}

/// Notification dispatched inside the context for other in-page logic
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEvent {
    pub name: String,
    pub detail: Value,
    pub ts: String,
}

impl LocalEvent {
    fn with_now(name: impl Into<String>, detail: Value) -> Self {
        Self {
            name: name.into(),
            detail,
            ts: now_rfc3339(),
        }
    }
}

pub struct Agent {
    state: AgentState,
    extractor: Arc<dyn Extractor>,
    listeners: Vec<PageListener>,
    local: broadcast::Sender<LocalEvent>,
    outbox: Option<mpsc::UnboundedSender<OrchestratorCommand>>,
}

impl Agent {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        let (local, _) = broadcast::channel(LOCAL_EVENT_CAPACITY);
        Self {
            state: AgentState::Uninitialized,
            extractor,
            listeners: Vec::new(),
            local,
            outbox: None,
        }
    }

    /// Route agent-initiated commands to the orchestrator.
    pub fn with_outbox(mut self, outbox: mpsc::UnboundedSender<OrchestratorCommand>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn listeners(&self) -> &[PageListener] {
        &self.listeners
    }

    pub fn subscribe_local(&self) -> broadcast::Receiver<LocalEvent> {
        self.local.subscribe()
    }

    pub fn handle(&mut self, command: &AgentCommand) -> Result<AgentReply, AgentError> {
        match command {
            AgentCommand::Activate => {
                self.activate();
                Ok(AgentReply::Ready)
            }
            _ if self.state != AgentState::Active => Err(AgentError::NotActive),
            AgentCommand::Extract => self.extract().map(AgentReply::Content),
            AgentCommand::Acknowledge => {
                self.announce(ACKNOWLEDGED_EVENT, Value::Null);
                Ok(AgentReply::Acknowledged)
            }
            AgentCommand::ContentAvailable(_) => {
                let detail = serde_json::to_value(command).unwrap_or(Value::Null);
                self.announce(command.tag(), detail);
                Ok(AgentReply::Forwarded)
            }
        }
    }

    /// Handle a raw command. Tags outside the agent protocol are passed through
    /// as local notifications rather than rejected.
    pub fn handle_raw(&mut self, raw: &Value) -> Result<AgentReply, AgentError> {
        let tag = command_tag(raw).map(str::to_string);
        match tag {
            Some(tag) if AgentCommand::TAGS.contains(&tag.as_str()) => {
                match AgentCommand::parse(raw) {
                    Ok(command) => self.handle(&command),
                    Err(e) => {
                        warn!(tag = %tag, error = %e, "Malformed command forwarded as local event");
                        self.passthrough(&tag, raw)
                    }
                }
            }
            Some(tag) => self.passthrough(&tag, raw),
            None => self.passthrough("message", raw),
        }
    }

    fn passthrough(&self, name: &str, raw: &Value) -> Result<AgentReply, AgentError> {
        if self.state != AgentState::Active {
            return Err(AgentError::NotActive);
        }
        self.announce(name, raw.clone());
        Ok(AgentReply::Forwarded)
    }

    /// Feed an in-page event to the agent. Returns whether a listener handled it.
    pub fn dispatch_page_event(&self, name: &str, detail: Value) -> Result<bool, AgentError> {
        let Some(listener) = PageListener::from_event_name(name) else {
            return Ok(false);
        };
        if self.state != AgentState::Active || !self.listeners.contains(&listener) {
            return Ok(false);
        }

        match listener {
            PageListener::ScrapeRequest => {
                let url = detail
                    .as_str()
                    .or_else(|| detail.get("url").and_then(Value::as_str))
                    .map(str::trim)
                    .filter(|url| !url.is_empty());
                let Some(url) = url else {
                    warn!("Ignoring scrape request without a URL");
                    return Ok(false);
                };
                self.send_to_orchestrator(OrchestratorCommand::ScrapeRequest {
                    url: url.to_string(),
                })?;
            }
            PageListener::UrlListRequest => {
                self.send_to_orchestrator(OrchestratorCommand::UrlListRequest)?;
            }
            PageListener::Acknowledge => self.announce(ACKNOWLEDGED_EVENT, Value::Null),
        }
        Ok(true)
    }

    /// Extract the page and push it to the orchestrator as `content-ready`.
    pub fn publish_content(&self) -> Result<(), AgentError> {
        if self.state != AgentState::Active {
            return Err(AgentError::NotActive);
        }
        let payload = self.extract()?;
        self.send_to_orchestrator(OrchestratorCommand::content_ready(payload))
    }

    fn activate(&mut self) {
        // Re-activation replaces the listener set rather than stacking duplicates
        self.listeners.clear();
        self.listeners.extend(PageListener::ALL);
        self.state = AgentState::Active;
        debug!(listeners = self.listeners.len(), "Agent activated");
        self.announce(READY_EVENT, json!({ "listeners": self.listeners.len() }));
    }

    fn extract(&self) -> Result<ContentPayload, AgentError> {
        let snapshot = self.extractor.extract().map_err(AgentError::Extraction)?;
        Ok(ContentPayload::with_now(
            snapshot.html,
            snapshot.url,
            snapshot.title,
        ))
    }

    fn announce(&self, name: &str, detail: Value) {
        // No in-page observers is not an error
        let _ = self.local.send(LocalEvent::with_now(name, detail));
    }

    fn send_to_orchestrator(&self, command: OrchestratorCommand) -> Result<(), AgentError> {
        let outbox = self.outbox.as_ref().ok_or(AgentError::OutboxClosed)?;
        outbox.send(command).map_err(|_| AgentError::OutboxClosed)
    }
}
