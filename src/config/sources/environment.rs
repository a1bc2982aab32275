//! Environment overrides: TABRELAY__RELAY__LOAD_TIMEOUT_MS=5000, TABRELAY__RELAY__DENYLIST=a,b

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub const ENV_PREFIX: &str = "TABRELAY";

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("relay.denylist"),
    )
}
