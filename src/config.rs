//! Configuration System
//!
//! Immutable, process-wide settings for the orchestrator: denylist, retry policy,
//! load timeout, consumer window designation, injected script names and logging.
//! Loaded once from layered sources and threaded into each component at construction.

use crate::error::RelayError;
use crate::logging::LoggingConfig;
use crate::types::WindowId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod merge;
mod sources;

pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TabrelayConfig {
    /// Orchestration settings
    #[serde(default)]
    pub relay: RelayConfig,

    /// Scripts injected into each context
    #[serde(default)]
    pub injection: InjectionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// URL prefixes excluded from injection and distribution
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// How long a newly created context may take to finish loading
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Window whose contexts receive distributed content; the focused window when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_window: Option<WindowId>,
}

fn default_denylist() -> Vec<String> {
    vec![
        "chrome://".to_string(),
        "edge://".to_string(),
        "127.0.0.1".to_string(),
    ]
}

fn default_load_timeout_ms() -> u64 {
    30_000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            denylist: default_denylist(),
            retry: RetryPolicy::default(),
            load_timeout_ms: default_load_timeout_ms(),
            consumer_window: None,
        }
    }
}

impl RelayConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

/// Fixed-backoff retry policy applied to every relayed command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    #[serde(default = "default_attempts")]
    pub attempts: usize,
    /// Delay between attempts (milliseconds)
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_attempts() -> usize {
    3
}

fn default_delay_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: usize, delay_ms: u64) -> Self {
        Self { attempts, delay_ms }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Names of the scripts installed into each context, in install order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionConfig {
    #[serde(default = "default_runtime_shim")]
    pub runtime_shim: String,
    #[serde(default = "default_capability_agent")]
    pub capability_agent: String,
}

fn default_runtime_shim() -> String {
    "browser-polyfill.js".to_string()
}

fn default_capability_agent() -> String {
    "content.js".to_string()
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            runtime_shim: default_runtime_shim(),
            capability_agent: default_capability_agent(),
        }
    }
}

impl TabrelayConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.relay.retry.attempts == 0 {
            errors.push("relay.retry.attempts must be at least 1".to_string());
        }
        if self.relay.load_timeout_ms == 0 {
            errors.push("relay.load_timeout_ms must be greater than 0".to_string());
        }
        for (index, prefix) in self.relay.denylist.iter().enumerate() {
            if prefix.is_empty() {
                // An empty prefix would match every URL
                errors.push(format!("relay.denylist[{}] is empty", index));
            }
        }
        if self.injection.runtime_shim.trim().is_empty() {
            errors.push("injection.runtime_shim cannot be empty".to_string());
        }
        if self.injection.capability_agent.trim().is_empty() {
            errors.push("injection.capability_agent cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Loads configuration from defaults, the global file, an optional explicit file and
/// `TABRELAY__` environment overrides, in increasing precedence.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(explicit: Option<&Path>) -> Result<TabrelayConfig, RelayError> {
        let mut builder = merge::merge_policy::builder_with_defaults()?;
        builder = sources::global_file::add_to_builder(builder)?;
        if let Some(path) = explicit {
            builder = sources::explicit_file::add_to_builder(builder, path)?;
        }
        builder = sources::environment::add_to_builder(builder);

        let config: TabrelayConfig = builder.build()?.try_deserialize()?;
        Self::validated(config)
    }

    /// Load a single file on top of the defaults, ignoring global and environment sources.
    pub fn load_from_file(path: &Path) -> Result<TabrelayConfig, RelayError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::explicit_file::add_to_builder(builder, path)?;
        let config: TabrelayConfig = builder.build()?.try_deserialize()?;
        Self::validated(config)
    }

    fn validated(config: TabrelayConfig) -> Result<TabrelayConfig, RelayError> {
        config.validate().map_err(|errors| {
            RelayError::Config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            ))
        })?;
        Ok(config)
    }
}
