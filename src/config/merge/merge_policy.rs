//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources replace lists wholesale, so a file that sets `relay.denylist`
/// overrides the default prefixes instead of appending to them.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default(
            "relay.denylist",
            vec!["chrome://", "edge://", "127.0.0.1"],
        )?
        .set_default("relay.retry.attempts", 3)?
        .set_default("relay.retry.delay_ms", 1000)?
        .set_default("relay.load_timeout_ms", 30000)?
        .set_default("injection.runtime_shim", "browser-polyfill.js")?
        .set_default("injection.capability_agent", "content.js")
}
