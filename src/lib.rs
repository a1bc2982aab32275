//! Tabrelay: Agent Injection and Content Relay
//!
//! Orchestrates a lightweight agent across many sandboxed execution contexts: installs
//! it on startup and on context creation, relays commands with bounded retries, scrapes
//! content on request and fans it out to the consumer window.

pub mod agent;
pub mod cli;
pub mod config;
pub mod denylist;
pub mod distribute;
pub mod error;
pub mod host;
pub mod injection;
pub mod load_waiter;
pub mod logging;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod scrape;
pub mod subscription;
pub mod types;

pub use error::{HostError, RelayError};
pub use orchestrator::{InboundRequest, Orchestrator};
