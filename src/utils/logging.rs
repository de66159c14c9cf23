// src/utils/logging.rs
use tracing_subscriber::{fmt, EnvFilter};

/// Sets up the logging framework using tracing_subscriber.
/// Reads log level filters from the `RUST_LOG` environment variable,
/// falling back to `default_level` (e.g. "info", or "debug" with `--debug`).
pub fn setup_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    // try_init so a second call (tests, embedding) does not panic
    if fmt().with_env_filter(filter).with_target(false).try_init().is_err() {
        tracing::debug!("Global subscriber already installed, keeping it.");
        return;
    }

    tracing::debug!("Logging setup complete.");
}
