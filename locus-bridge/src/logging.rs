//! Logging setup for hosts embedding the bridge
//!
//! Hosts usually own stdout and stderr, so nothing is installed unless the
//! host asks for it.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// How log output is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed
    Silent,
    /// Compact stderr output at info level
    Development,
    /// Verbose output with thread names and source locations
    Debug,
    /// One JSON object per line, for log collectors
    Json,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),
}

/// Install a global tracing subscriber for `mode`
///
/// The filter comes from `LOCUS_LOG_LEVEL`, then `RUST_LOG`, then the mode's
/// default level.
///
/// ```rust,ignore
/// locus_bridge::logging::init_logging(LoggingMode::Development)?;
/// ```
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let result = match mode {
        LoggingMode::Silent => return Ok(()),
        LoggingMode::Development => Registry::default()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .with(env_filter("info"))
            .try_init(),
        LoggingMode::Debug => Registry::default()
            .with(
                fmt::layer()
                    .pretty()
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter("debug"))
            .try_init(),
        LoggingMode::Json => Registry::default()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter("info"))
            .try_init(),
    };

    result.map_err(|e| LoggingError::TracingInit(e.to_string()))
}

/// Install a subscriber chosen by `LOCUS_LOG_MODE`
///
/// Accepts "development", "debug" and "json"; anything else is silent.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = std::env::var("LOCUS_LOG_MODE")
        .map(|value| parse_mode(&value))
        .unwrap_or(LoggingMode::Silent);
    init_logging(mode)
}

fn parse_mode(value: &str) -> LoggingMode {
    match value.trim().to_ascii_lowercase().as_str() {
        "development" | "dev" => LoggingMode::Development,
        "debug" => LoggingMode::Debug,
        "json" => LoggingMode::Json,
        _ => LoggingMode::Silent,
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    if let Ok(level) = std::env::var("LOCUS_LOG_LEVEL") {
        EnvFilter::new(level)
    } else if let Ok(rust_log) = std::env::var("RUST_LOG") {
        EnvFilter::new(rust_log)
    } else {
        EnvFilter::new(default_level)
    }
}

/// Install development logging unless a subscriber is already set
///
/// Safe to call from every test and demo entry point.
pub fn init_tracing() {
    if !is_initialized() {
        let _ = init_logging(LoggingMode::Development);
    }
}

pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}
