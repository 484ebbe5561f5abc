//! Tracing setup for the binary.

use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::Config;

/// Install a stderr fmt subscriber. `RUST_LOG` wins over `LOG_LEVEL`.
/// Calling this twice is harmless.
pub fn init(cfg: &Config) {
    let level = cfg.get("LOG_LEVEL").unwrap_or_else(|| "warn".into());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("snipbox={level}")));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();

    if let Err(err) = init_result {
        tracing::debug!(error = %err, "tracing already initialized");
    }
}
