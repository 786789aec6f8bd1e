//! Logging initialization for the relay.
//!
//! Thin wrapper over the observability crate: structured JSONL goes to
//! `~/.signal-relay/logs/relay.jsonl` (or the path given), compact lines to
//! stderr for foreground runs.

use std::path::PathBuf;

const SERVICE_NAME: &str = "signal-relay";

/// Initialize the logging system for the relay.
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// ```ignore
/// init_logging("info", None);
/// tracing::info!(shard = 0, "shard connected");
/// ```
pub fn init_logging(level: &str, log_path: Option<PathBuf>) {
    observability::init_with_config(observability::LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        log_path,
        also_stderr: true,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
