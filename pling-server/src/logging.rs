use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Initialize tracing for the embedding binary.
///
/// `RUST_LOG` wins over the configured level; format is `json` or pretty.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
