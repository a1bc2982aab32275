//! Subscription registry for host lifecycle notifications.
//!
//! The host publishes every lifecycle notification into an [`EventHub`]. Components
//! observe them through [`Subscription`] handles: one scoped to a single context for
//! state changes, or one for context creation. A handle deregisters itself when
//! dropped, so every exit path of the owning operation releases it exactly once.

use crate::types::{ContextId, ExecutionContext, LoadState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// Lifecycle notification raised by the host runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Created(ExecutionContext),
    Updated(ContextUpdate),
    Removed(ContextId),
}

/// State change of a single context; fields are `None` when unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextUpdate {
    pub context_id: ContextId,
    pub url: Option<String>,
    pub load_state: Option<LoadState>,
}

/// Notification delivered to a per-context subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextSignal {
    Updated(ContextUpdate),
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SubscriptionId(u64);

#[derive(Default)]
struct HubState {
    next_id: u64,
    per_context: HashMap<SubscriptionId, (ContextId, UnboundedSender<ContextSignal>)>,
    creations: HashMap<SubscriptionId, UnboundedSender<ExecutionContext>>,
}

impl HubState {
    fn allocate(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }
}

/// Routes host notifications to live subscriptions.
#[derive(Clone, Default)]
pub struct EventHub {
    state: Arc<Mutex<HubState>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a host notification to every matching subscription.
    pub fn publish(&self, event: HostEvent) {
        let mut state = self.state.lock();
        match event {
            HostEvent::Created(context) => {
                trace!(context_id = %context.id, "context created");
                state
                    .creations
                    .retain(|_, tx| tx.send(context.clone()).is_ok());
            }
            HostEvent::Updated(update) => {
                let target = update.context_id;
                state.per_context.retain(|_, (context_id, tx)| {
                    *context_id != target || tx.send(ContextSignal::Updated(update.clone())).is_ok()
                });
            }
            HostEvent::Removed(target) => {
                state.per_context.retain(|_, (context_id, tx)| {
                    *context_id != target || tx.send(ContextSignal::Removed).is_ok()
                });
            }
        }
    }

    /// Observe state changes of one context.
    pub fn subscribe_context(&self, context_id: ContextId) -> Subscription<ContextSignal> {
        let (tx, rx) = unbounded_channel();
        let mut state = self.state.lock();
        let id = state.allocate();
        state.per_context.insert(id, (context_id, tx));
        Subscription {
            id,
            receiver: rx,
            hub: self.clone(),
        }
    }

    /// Observe context creation.
    pub fn subscribe_created(&self) -> Subscription<ExecutionContext> {
        let (tx, rx) = unbounded_channel();
        let mut state = self.state.lock();
        let id = state.allocate();
        state.creations.insert(id, tx);
        Subscription {
            id,
            receiver: rx,
            hub: self.clone(),
        }
    }

    /// Number of live subscriptions scoped to `context_id`.
    pub fn active_for(&self, context_id: ContextId) -> usize {
        self.state
            .lock()
            .per_context
            .values()
            .filter(|(id, _)| *id == context_id)
            .count()
    }

    /// Number of live subscriptions of any kind.
    pub fn active_count(&self) -> usize {
        let state = self.state.lock();
        state.per_context.len() + state.creations.len()
    }

    fn release(&self, id: SubscriptionId) {
        let mut state = self.state.lock();
        let removed =
            state.per_context.remove(&id).is_some() || state.creations.remove(&id).is_some();
        if removed {
            trace!(subscription = id.0, "subscription released");
        }
    }
}

/// Handle to a live subscription. Dropping it deregisters the observer.
pub struct Subscription<T> {
    id: SubscriptionId,
    receiver: UnboundedReceiver<T>,
    hub: EventHub,
}

impl<T> Subscription<T> {
    /// Next notification, or `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.hub.release(self.id);
    }
}
