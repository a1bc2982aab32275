//! Core data model: execution contexts, windows and extracted content.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of an execution context, allocated by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity of a window owning one or more contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Loading,
    Complete,
}

/// Point-in-time view of a live execution context.
///
/// Snapshots go stale as soon as the host navigates or closes the context, so
/// nothing in the crate holds on to one across an await point as ground truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub id: ContextId,
    pub url: String,
    pub window_id: WindowId,
    pub load_state: LoadState,
    /// Focus flag of the owning window
    pub focused: bool,
}

impl ExecutionContext {
    pub fn is_loaded(&self) -> bool {
        self.load_state == LoadState::Complete
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub id: WindowId,
    pub focused: bool,
    pub contexts: Vec<ExecutionContext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub title: String,
    /// RFC 3339 UTC timestamp with millisecond precision
    pub timestamp: String,
}

/// Markup extracted from a context. Forwarded verbatim to every recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPayload {
    pub content: String,
    pub source_url: String,
    pub metadata: ContentMetadata,
}

impl ContentPayload {
    pub fn new(
        content: impl Into<String>,
        source_url: impl Into<String>,
        title: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            source_url: source_url.into(),
            metadata: ContentMetadata {
                title: title.into(),
                timestamp: timestamp.into(),
            },
        }
    }

    /// Build a payload stamped with the current time.
    pub fn with_now(
        content: impl Into<String>,
        source_url: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self::new(content, source_url, title, now_rfc3339())
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
