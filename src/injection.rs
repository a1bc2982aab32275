//! Injection Orchestrator
//!
//! Installs the agent into execution contexts. Installation is a pipeline of three
//! discrete steps run strictly in order: inject the runtime shim, inject the
//! capability agent, then send `activate`. The first failing step aborts the
//! pipeline for that context only.
//!
//! Two triggers drive it: the startup sweep over every existing context, and the
//! creation reaction, which installs into each new context once it first finishes
//! loading.

use crate::config::InjectionConfig;
use crate::denylist::Denylist;
use crate::error::{InstallStage, RelayError};
use crate::host::{Host, Script};
use crate::protocol::AgentCommand;
use crate::registry::ContextRegistry;
use crate::subscription::{ContextSignal, EventHub};
use crate::types::{now_rfc3339, ContextId, ExecutionContext, LoadState};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of a startup sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub installed: Vec<ContextId>,
    pub skipped: Vec<ContextId>,
    pub failed: Vec<FailedInstall>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedInstall {
    pub context_id: ContextId,
    pub error: String,
}

/// Outcome of reacting to one created context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationOutcome {
    Installed(ContextId),
    Denied(ContextId),
    Failed(ContextId, String),
}

pub struct InjectionOrchestrator {
    host: Arc<dyn Host>,
    registry: ContextRegistry,
    hub: EventHub,
    denylist: Denylist,
    runtime_shim: Script,
    capability_agent: Script,
}

impl InjectionOrchestrator {
    pub fn new(
        host: Arc<dyn Host>,
        hub: EventHub,
        denylist: Denylist,
        scripts: &InjectionConfig,
    ) -> Self {
        let registry = ContextRegistry::new(Arc::clone(&host));
        Self {
            host,
            registry,
            hub,
            denylist,
            runtime_shim: Script::new(scripts.runtime_shim.clone()),
            capability_agent: Script::new(scripts.capability_agent.clone()),
        }
    }

    /// Run the install pipeline for one context.
    pub async fn install(&self, context_id: ContextId) -> Result<(), RelayError> {
        self.inject_step(context_id, InstallStage::RuntimeShim, &self.runtime_shim)
            .await?;
        self.inject_step(
            context_id,
            InstallStage::CapabilityAgent,
            &self.capability_agent,
        )
        .await?;
        self.activate(context_id).await?;
        debug!(context_id = %context_id, "Agent installed");
        Ok(())
    }

    async fn inject_step(
        &self,
        context_id: ContextId,
        stage: InstallStage,
        script: &Script,
    ) -> Result<(), RelayError> {
        self.host
            .inject(context_id, script)
            .await
            .map_err(|e| RelayError::Injection {
                context_id,
                stage,
                reason: e.to_string(),
            })
    }

    async fn activate(&self, context_id: ContextId) -> Result<(), RelayError> {
        self.host
            .send(context_id, &AgentCommand::Activate)
            .await
            .map(|_| ())
            .map_err(|e| RelayError::Injection {
                context_id,
                stage: InstallStage::Activation,
                reason: e.to_string(),
            })
    }

    /// Install into every existing, non-denylisted context.
    ///
    /// Installs are issued together and awaited individually; a failure is logged
    /// and recorded without affecting the others. Only the initial listing can fail
    /// the sweep as a whole.
    pub async fn sweep(&self) -> Result<SweepReport, RelayError> {
        let contexts = self.registry.list_all().await?;
        let (targets, denied): (Vec<ExecutionContext>, Vec<ExecutionContext>) = contexts
            .into_iter()
            .partition(|context| self.denylist.allows(context));

        let mut report = SweepReport {
            skipped: denied.iter().map(|c| c.id).collect(),
            ..SweepReport::default()
        };

        let results = join_all(targets.iter().map(|context| async move {
            (context.id, self.install(context.id).await)
        }))
        .await;

        for (context_id, result) in results {
            match result {
                Ok(()) => report.installed.push(context_id),
                Err(err) => {
                    log_install_failure(context_id, &err);
                    report.failed.push(FailedInstall {
                        context_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            installed = report.installed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Startup sweep finished"
        );
        Ok(report)
    }

    /// Wait for a new context to finish its first load, then install into it.
    ///
    /// The denylist is checked against the URL the context loaded with, not the one
    /// it was created with. Subsequent loads of the same context never re-trigger.
    pub async fn react_to_creation(&self, context_id: ContextId) -> CreationOutcome {
        let loaded = match self.first_load(context_id).await {
            Ok(context) => context,
            Err(err) => {
                debug!(context_id = %context_id, error = %err, "Created context never loaded");
                return CreationOutcome::Failed(context_id, err.to_string());
            }
        };

        if let Some(prefix) = self.denylist.matching_prefix(&loaded.url) {
            debug!(context_id = %context_id, url = %loaded.url, prefix, "Skipping denylisted context");
            return CreationOutcome::Denied(context_id);
        }

        match self.install(context_id).await {
            Ok(()) => CreationOutcome::Installed(context_id),
            Err(err) => {
                log_install_failure(context_id, &err);
                CreationOutcome::Failed(context_id, err.to_string())
            }
        }
    }

    /// Follow a created context on the hub until it first completes loading.
    ///
    /// Kept apart from `LoadWaiter` so a scrape waiting on the same context still
    /// holds the only load-waiter registration for that id.
    async fn first_load(&self, context_id: ContextId) -> Result<ExecutionContext, RelayError> {
        let mut signals = self.hub.subscribe_context(context_id);
        match self.registry.get(context_id).await? {
            None => return Err(RelayError::ContextClosed(context_id)),
            Some(context) if context.is_loaded() => return Ok(context),
            Some(_) => {}
        }

        while let Some(signal) = signals.recv().await {
            match signal {
                ContextSignal::Updated(update) if update.load_state == Some(LoadState::Complete) => {
                    return self
                        .registry
                        .get(context_id)
                        .await?
                        .ok_or(RelayError::ContextClosed(context_id));
                }
                ContextSignal::Updated(_) => {}
                ContextSignal::Removed => break,
            }
        }
        Err(RelayError::ContextClosed(context_id))
    }

    /// Start the creation reaction.
    ///
    /// The creation subscription is registered before this returns, so contexts
    /// created afterwards are never missed. Aborting the handle releases it.
    pub fn watch_creations(self: &Arc<Self>) -> JoinHandle<()> {
        let mut created = self.hub.subscribe_created();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(context) = created.recv().await {
                let worker = Arc::clone(&this);
                tokio::spawn(async move {
                    worker.react_to_creation(context.id).await;
                });
            }
        })
    }
}

fn log_install_failure(context_id: ContextId, err: &RelayError) {
    let stage = match err {
        RelayError::Injection { stage, .. } => stage.to_string(),
        _ => "lookup".to_string(),
    };
    warn!(
        context_id = %context_id,
        stage = %stage,
        timestamp = %now_rfc3339(),
        error = %err,
        "Failed to install agent"
    );
}
