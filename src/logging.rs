//! Log setup for the provider process.
//!
//! Stdout carries the plugin protocol, so all log output goes to stderr,
//! where the host collects it. The level comes from `TF_LOG_PROVIDER`, then
//! `RUST_LOG`.

use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_ENV: &str = "TF_LOG_PROVIDER";

/// Builds the filter from the environment.
///
/// `TF_LOG_PROVIDER` takes host-style levels (`TRACE`, `DEBUG`, `INFO`,
/// `WARN`, `ERROR`, `OFF`); `RUST_LOG` takes full directives.
pub fn filter_from(tf_log: Option<&str>, rust_log: Option<&str>, debug: bool) -> EnvFilter {
    let fallback = if debug { "debug" } else { "warn" };
    let directives = tf_log
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.trim().to_ascii_lowercase())
        .or_else(|| rust_log.filter(|v| !v.trim().is_empty()).map(str::to_string))
        .unwrap_or_else(|| fallback.to_string());
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(debug: bool) {
    let tf_log = std::env::var(LOG_LEVEL_ENV).ok();
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(filter_from(tf_log.as_deref(), rust_log.as_deref(), debug))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}
