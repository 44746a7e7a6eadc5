//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise the filter comes from the `[logging]`
//! section of the settings.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Builds the filter directive string from the config.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = vec![config.default.clone()];
    directives.extend(
        config
            .modules
            .iter()
            .map(|(module, level)| format!("{module}={level}")),
    );
    directives.join(",")
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directives(config)))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .without_time()
        .compact()
        .try_init();
}
