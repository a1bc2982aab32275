//! In-memory host runtime.
//!
//! Simulates windows, execution contexts and the agents injected into them, and
//! publishes lifecycle notifications into an [`EventHub`]. Failure injection and a
//! log of every send attempt make it the harness for exercising the orchestrator.

use crate::agent::{Agent, AgentError, AgentState, Extractor, LocalEvent, PageSnapshot};
use crate::config::InjectionConfig;
use crate::error::HostError;
use crate::host::{Host, Script};
use crate::orchestrator::InboundRequest;
use crate::protocol::{AgentCommand, AgentReply};
use crate::subscription::{ContextUpdate, EventHub, HostEvent};
use crate::types::{ContextId, ExecutionContext, LoadState, Window, WindowId};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// One recorded delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRecord {
    pub context_id: ContextId,
    pub tag: &'static str,
    pub delivered: bool,
}

#[derive(Debug, Clone, Copy)]
enum SendFailure {
    Next(usize),
    Always,
}

struct ContextEntry {
    url: String,
    window_id: WindowId,
    load_state: LoadState,
    title: String,
    html: Option<String>,
    scripts: Vec<String>,
    agent: Option<Arc<Mutex<Agent>>>,
}

impl ContextEntry {
    fn new(url: &str, window_id: WindowId, load_state: LoadState) -> Self {
        Self {
            url: url.to_string(),
            window_id,
            load_state,
            title: url.to_string(),
            html: None,
            scripts: Vec::new(),
            agent: None,
        }
    }

    /// Full reload: injected code and agent state are gone.
    fn reset(&mut self) {
        self.scripts.clear();
        self.agent = None;
    }
}

struct WindowEntry {
    id: WindowId,
    focused: bool,
    contexts: Vec<ContextId>,
}

#[derive(Default)]
struct HostState {
    next_context: u64,
    next_window: u64,
    windows: Vec<WindowEntry>,
    contexts: BTreeMap<ContextId, ContextEntry>,
    auto_complete: bool,
    send_failures: HashMap<ContextId, SendFailure>,
    injection_failures: HashSet<(ContextId, String)>,
    extraction_failures: HashSet<ContextId>,
    window_queries_fail: bool,
    send_log: Vec<SendRecord>,
    inbound: Option<mpsc::UnboundedSender<InboundRequest>>,
}

impl HostState {
    fn snapshot(&self, id: ContextId) -> Option<ExecutionContext> {
        let entry = self.contexts.get(&id)?;
        let focused = self
            .windows
            .iter()
            .find(|w| w.id == entry.window_id)
            .map(|w| w.focused)
            .unwrap_or(false);
        Some(ExecutionContext {
            id,
            url: entry.url.clone(),
            window_id: entry.window_id,
            load_state: entry.load_state,
            focused,
        })
    }

    fn ordered_ids(&self) -> Vec<ContextId> {
        self.windows
            .iter()
            .flat_map(|w| w.contexts.iter().copied())
            .collect()
    }

    fn insert_context(&mut self, window_id: WindowId, url: &str, load_state: LoadState) -> ContextId {
        self.next_context += 1;
        let id = ContextId(self.next_context);
        self.contexts
            .insert(id, ContextEntry::new(url, window_id, load_state));
        if let Some(window) = self.windows.iter_mut().find(|w| w.id == window_id) {
            window.contexts.push(id);
        }
        id
    }

    fn insert_window(&mut self, focused: bool) -> WindowId {
        self.next_window += 1;
        let id = WindowId(self.next_window);
        if focused {
            for window in &mut self.windows {
                window.focused = false;
            }
        }
        self.windows.push(WindowEntry {
            id,
            focused,
            contexts: Vec::new(),
        });
        id
    }

    /// Failure planned for the next send to `id`, consuming one use of a bounded plan.
    fn take_send_failure(&mut self, id: ContextId) -> bool {
        match self.send_failures.get_mut(&id) {
            Some(SendFailure::Always) => true,
            Some(SendFailure::Next(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Extractor reading the simulated page of one context
struct PageExtractor {
    state: Weak<Mutex<HostState>>,
    context_id: ContextId,
}

impl Extractor for PageExtractor {
    fn extract(&self) -> Result<PageSnapshot, String> {
        let state = self
            .state
            .upgrade()
            .ok_or_else(|| "host is gone".to_string())?;
        let state = state.lock();
        if state.extraction_failures.contains(&self.context_id) {
            return Err("document is not serializable".to_string());
        }
        let entry = state
            .contexts
            .get(&self.context_id)
            .ok_or_else(|| "context is gone".to_string())?;
        let html = entry.html.clone().unwrap_or_else(|| {
            format!(
                "<html><head><title>{}</title></head><body></body></html>",
                entry.title
            )
        });
        Ok(PageSnapshot {
            html,
            url: entry.url.clone(),
            title: entry.title.clone(),
        })
    }
}

/// Host runtime kept entirely in memory
#[derive(Clone)]
pub struct InMemoryHost {
    state: Arc<Mutex<HostState>>,
    hub: EventHub,
    scripts: InjectionConfig,
}

impl InMemoryHost {
    pub fn new(hub: EventHub) -> Self {
        Self::with_scripts(hub, InjectionConfig::default())
    }

    /// `scripts` names the shim that must precede the agent and the agent script itself.
    pub fn with_scripts(hub: EventHub, scripts: InjectionConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState::default())),
            hub,
            scripts,
        }
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Complete loads as soon as contexts are created or navigated.
    pub fn set_auto_complete(&self, enabled: bool) {
        self.state.lock().auto_complete = enabled;
    }

    /// Forward agent-initiated commands to an orchestrator inbox.
    pub fn connect_orchestrator(&self, inbound: mpsc::UnboundedSender<InboundRequest>) {
        self.state.lock().inbound = Some(inbound);
    }

    pub fn open_window(&self, focused: bool) -> WindowId {
        self.state.lock().insert_window(focused)
    }

    pub fn focus_window(&self, window_id: WindowId) {
        let mut state = self.state.lock();
        for window in &mut state.windows {
            window.focused = window.id == window_id;
        }
    }

    /// Add an already-loaded context without raising notifications, as found at startup.
    pub fn add_context(&self, window_id: WindowId, url: &str) -> ContextId {
        self.state
            .lock()
            .insert_context(window_id, url, LoadState::Complete)
    }

    /// Open a context the way a user would: `Created`, then `Complete` once loaded.
    pub fn spawn_context(&self, window_id: WindowId, url: &str) -> ContextId {
        let (id, snapshot, auto_complete) = {
            let mut state = self.state.lock();
            let id = state.insert_context(window_id, url, LoadState::Loading);
            (id, state.snapshot(id), state.auto_complete)
        };
        if let Some(snapshot) = snapshot {
            self.hub.publish(HostEvent::Created(snapshot));
        }
        if auto_complete {
            self.finish_load(id);
        }
        id
    }

    /// Mark a context loaded and notify observers.
    pub fn finish_load(&self, id: ContextId) {
        let url = {
            let mut state = self.state.lock();
            let Some(entry) = state.contexts.get_mut(&id) else {
                return;
            };
            entry.load_state = LoadState::Complete;
            entry.url.clone()
        };
        self.hub.publish(HostEvent::Updated(ContextUpdate {
            context_id: id,
            url: Some(url),
            load_state: Some(LoadState::Complete),
        }));
    }

    /// Navigate a context. The agent is lost with the old document.
    pub fn navigate(&self, id: ContextId, url: &str) {
        let auto_complete = {
            let mut state = self.state.lock();
            let Some(entry) = state.contexts.get_mut(&id) else {
                return;
            };
            entry.reset();
            entry.url = url.to_string();
            entry.title = url.to_string();
            entry.html = None;
            entry.load_state = LoadState::Loading;
            state.auto_complete
        };
        self.hub.publish(HostEvent::Updated(ContextUpdate {
            context_id: id,
            url: Some(url.to_string()),
            load_state: Some(LoadState::Loading),
        }));
        if auto_complete {
            self.finish_load(id);
        }
    }

    pub fn close(&self, id: ContextId) {
        let removed = {
            let mut state = self.state.lock();
            for window in &mut state.windows {
                window.contexts.retain(|c| *c != id);
            }
            state.send_failures.remove(&id);
            state.contexts.remove(&id).is_some()
        };
        if removed {
            self.hub.publish(HostEvent::Removed(id));
        }
    }

    pub fn set_page(&self, id: ContextId, title: &str, html: &str) {
        if let Some(entry) = self.state.lock().contexts.get_mut(&id) {
            entry.title = title.to_string();
            entry.html = Some(html.to_string());
        }
    }

    pub fn fail_next_sends(&self, id: ContextId, count: usize) {
        self.state
            .lock()
            .send_failures
            .insert(id, SendFailure::Next(count));
    }

    pub fn fail_all_sends(&self, id: ContextId) {
        self.state.lock().send_failures.insert(id, SendFailure::Always);
    }

    pub fn fail_injection(&self, id: ContextId, script: &str) {
        self.state
            .lock()
            .injection_failures
            .insert((id, script.to_string()));
    }

    pub fn fail_extraction(&self, id: ContextId) {
        self.state.lock().extraction_failures.insert(id);
    }

    /// Make every `query_windows` call fail until switched back off.
    pub fn fail_window_queries(&self, fail: bool) {
        self.state.lock().window_queries_fail = fail;
    }

    pub fn context(&self, id: ContextId) -> Option<ExecutionContext> {
        self.state.lock().snapshot(id)
    }

    pub fn context_count(&self) -> usize {
        self.state.lock().contexts.len()
    }

    pub fn injected_scripts(&self, id: ContextId) -> Vec<String> {
        self.state
            .lock()
            .contexts
            .get(&id)
            .map(|e| e.scripts.clone())
            .unwrap_or_default()
    }

    pub fn agent_state(&self, id: ContextId) -> Option<AgentState> {
        let agent = self.agent(id)?;
        let state = agent.lock().state();
        Some(state)
    }

    pub fn subscribe_agent(&self, id: ContextId) -> Option<broadcast::Receiver<LocalEvent>> {
        let agent = self.agent(id)?;
        let receiver = agent.lock().subscribe_local();
        Some(receiver)
    }

    /// Raise an in-page event for the agent of `id`. Returns whether it was handled.
    pub fn page_event(&self, id: ContextId, name: &str, detail: Value) -> bool {
        self.agent(id)
            .map(|agent| {
                agent
                    .lock()
                    .dispatch_page_event(name, detail)
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Have the agent of `id` push its page to the orchestrator as `content-ready`.
    pub fn push_content(&self, id: ContextId) -> bool {
        self.agent(id)
            .map(|agent| agent.lock().publish_content().is_ok())
            .unwrap_or(false)
    }

    pub fn send_log(&self) -> Vec<SendRecord> {
        self.state.lock().send_log.clone()
    }

    /// Attempts (delivered or not) made to `id` carrying `tag`.
    pub fn attempts(&self, id: ContextId, tag: &str) -> usize {
        self.state
            .lock()
            .send_log
            .iter()
            .filter(|r| r.context_id == id && r.tag == tag)
            .count()
    }

    /// Contexts that received `tag`, in delivery order.
    pub fn delivered(&self, tag: &str) -> Vec<ContextId> {
        self.state
            .lock()
            .send_log
            .iter()
            .filter(|r| r.delivered && r.tag == tag)
            .map(|r| r.context_id)
            .collect()
    }

    fn agent(&self, id: ContextId) -> Option<Arc<Mutex<Agent>>> {
        self.state.lock().contexts.get(&id)?.agent.clone()
    }

    fn build_agent(&self, id: ContextId) -> Agent {
        let extractor = Arc::new(PageExtractor {
            state: Arc::downgrade(&self.state),
            context_id: id,
        });
        let agent = Agent::new(extractor);

        let Some(inbound) = self.state.lock().inbound.clone() else {
            return agent;
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let command = match serde_json::to_value(&command) {
                    Ok(value) => value,
                    Err(_) => continue,
                };
                let request = InboundRequest {
                    sender: Some(id),
                    command,
                    reply: None,
                };
                if inbound.send(request).is_err() {
                    break;
                }
            }
        });
        agent.with_outbox(tx)
    }

    fn record(&self, context_id: ContextId, tag: &'static str, delivered: bool) {
        self.state.lock().send_log.push(SendRecord {
            context_id,
            tag,
            delivered,
        });
    }
}

#[async_trait]
impl Host for InMemoryHost {
    async fn query_contexts(&self) -> Result<Vec<ExecutionContext>, HostError> {
        let state = self.state.lock();
        Ok(state
            .ordered_ids()
            .into_iter()
            .filter_map(|id| state.snapshot(id))
            .collect())
    }

    async fn query_windows(&self) -> Result<Vec<Window>, HostError> {
        let state = self.state.lock();
        if state.window_queries_fail {
            return Err(HostError::QueryFailed("window list unavailable".to_string()));
        }
        Ok(state
            .windows
            .iter()
            .map(|w| Window {
                id: w.id,
                focused: w.focused,
                contexts: w
                    .contexts
                    .iter()
                    .filter_map(|id| state.snapshot(*id))
                    .collect(),
            })
            .collect())
    }

    async fn create_context(&self, url: &str, focused: bool) -> Result<ExecutionContext, HostError> {
        let (id, snapshot, auto_complete) = {
            let mut state = self.state.lock();
            let window_id = match state.windows.iter().find(|w| w.focused) {
                Some(window) => window.id,
                None => state.insert_window(focused),
            };
            let id = state.insert_context(window_id, url, LoadState::Loading);
            let snapshot = state
                .snapshot(id)
                .ok_or_else(|| HostError::QueryFailed(format!("context {} vanished", id)))?;
            (id, snapshot, state.auto_complete)
        };
        debug!(context_id = %id, url, "Created context");
        self.hub.publish(HostEvent::Created(snapshot.clone()));
        if auto_complete {
            self.finish_load(id);
        }
        Ok(snapshot)
    }

    async fn inject(&self, context_id: ContextId, script: &Script) -> Result<(), HostError> {
        let needs_agent = {
            let mut state = self.state.lock();
            if state
                .injection_failures
                .contains(&(context_id, script.file.clone()))
            {
                return Err(HostError::InjectionFailed {
                    context_id,
                    reason: format!("{} was rejected by the page", script.file),
                });
            }
            let entry = state
                .contexts
                .get_mut(&context_id)
                .ok_or(HostError::ContextNotFound(context_id))?;
            let is_agent = script.file == self.scripts.capability_agent;
            if is_agent && !entry.scripts.contains(&self.scripts.runtime_shim) {
                return Err(HostError::InjectionFailed {
                    context_id,
                    reason: format!("{} requires {}", script.file, self.scripts.runtime_shim),
                });
            }
            entry.scripts.push(script.file.clone());
            is_agent
        };

        if needs_agent {
            let agent = Arc::new(Mutex::new(self.build_agent(context_id)));
            if let Some(entry) = self.state.lock().contexts.get_mut(&context_id) {
                entry.agent = Some(agent);
            }
        }
        Ok(())
    }

    async fn send(
        &self,
        context_id: ContextId,
        command: &AgentCommand,
    ) -> Result<AgentReply, HostError> {
        let tag = command.tag();
        let agent = {
            let mut state = self.state.lock();
            let failure = if !state.contexts.contains_key(&context_id) {
                Some(HostError::ContextNotFound(context_id))
            } else if state.take_send_failure(context_id) {
                Some(HostError::AgentException {
                    context_id,
                    message: "receiving end does not exist".to_string(),
                })
            } else {
                None
            };
            match failure {
                Some(err) => {
                    state.send_log.push(SendRecord {
                        context_id,
                        tag,
                        delivered: false,
                    });
                    return Err(err);
                }
                None => state
                    .contexts
                    .get(&context_id)
                    .and_then(|entry| entry.agent.clone()),
            }
        };

        let Some(agent) = agent else {
            self.record(context_id, tag, false);
            return Err(HostError::AgentNotInstalled(context_id));
        };

        let result = agent.lock().handle(command);
        self.record(context_id, tag, result.is_ok());
        result.map_err(|e| match e {
            AgentError::Extraction(reason) => HostError::ExtractionFailed { context_id, reason },
            other => HostError::AgentException {
                context_id,
                message: other.to_string(),
            },
        })
    }
}
