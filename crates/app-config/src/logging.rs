//! Logging initialization for the client.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging system.
///
/// Sets up tracing with:
/// - Log level from RUST_LOG env var or the provided default
/// - Structured output to stderr
///
/// # Arguments
///
/// * `level` - Default log level (trace, debug, info, warn, error)
///
/// # Example
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("Client started");
/// ```
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    // try_init so repeated calls (tests, embedded hosts) are harmless
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
