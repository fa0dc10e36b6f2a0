//! Logging setup for the controller and the daemon
//!
//! The controller itself only emits `tracing` events. This module installs a
//! subscriber for them, picked by [`LoggingMode`].

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed
    Silent,
    /// Compact stderr output
    Development,
    /// Verbose output with thread ids and source locations
    Debug,
    /// One JSON object per line, for log collectors
    Json,
}

impl LoggingMode {
    /// Parse a mode name as used in `IPORT_LOG_MODE`
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "silent" => Some(LoggingMode::Silent),
            "development" | "dev" => Some(LoggingMode::Development),
            "debug" => Some(LoggingMode::Debug),
            "json" => Some(LoggingMode::Json),
            _ => None,
        }
    }
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid log filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },
}

/// Initialize logging with the specified mode
///
/// Call once, early. A second call fails with
/// [`LoggingError::TracingInit`].
///
/// # Environment Variables
///
/// - `IPORT_LOG_LEVEL`: filter directive, e.g. `debug` or
///   `button_controller=trace,info`
/// - `RUST_LOG`: used when `IPORT_LOG_LEVEL` is unset
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    init_logging_with_filter(mode, None)
}

/// Like [`init_logging`], with an explicit filter taking precedence over the
/// environment
pub fn init_logging_with_filter(mode: LoggingMode, filter: Option<&str>) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default_level = match mode {
        LoggingMode::Silent => return Ok(()),
        LoggingMode::Debug => "debug",
        LoggingMode::Development | LoggingMode::Json => "info",
    };
    let filter = match filter {
        Some(directive) => parse_filter(directive)?,
        None => create_env_filter(default_level)?,
    };

    let result = match mode {
        LoggingMode::Development => Registry::default()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            )
            .with(filter)
            .try_init(),
        LoggingMode::Debug => Registry::default()
            .with(
                fmt::layer()
                    .pretty()
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(filter)
            .try_init(),
        LoggingMode::Json => Registry::default()
            .with(fmt::layer().json().with_current_span(false))
            .with(filter)
            .try_init(),
        LoggingMode::Silent => Ok(()),
    };

    result.map_err(|e| LoggingError::TracingInit(e.to_string()))
}

/// Initialize logging from environment variables
///
/// Reads `IPORT_LOG_MODE` (`silent`, `development`, `debug`, `json`).
/// Defaults to Development, since the daemon is a background service whose
/// stderr is usually captured.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = std::env::var("IPORT_LOG_MODE")
        .ok()
        .and_then(|name| LoggingMode::from_name(&name))
        .unwrap_or(LoggingMode::Development);

    init_logging(mode)
}

/// Create an environment filter with fallback to default level
fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    // First try IPORT_LOG_LEVEL, then RUST_LOG, then default
    if let Ok(level) = std::env::var("IPORT_LOG_LEVEL") {
        return parse_filter(&level);
    }
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        return parse_filter(&rust_log);
    }
    parse_filter(default_level)
}

fn parse_filter(directive: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directive).map_err(|e| LoggingError::InvalidFilter {
        filter: directive.to_string(),
        reason: e.to_string(),
    })
}
