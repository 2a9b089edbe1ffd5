//! Logging setup shared by the library's consumers
//!
//! Supports text, JSON and pretty output on stderr, with the filter taken
//! from `RUST_LOG` when set.
//!
//! # Examples
//!
//! ```no_run
//! use libpointbook::logging::{LoggingConfig, LogFormat};
//!
//! LoggingConfig::new(LogFormat::Json, "info".to_string(), false).init();
//!
//! // Or honour POINTBOOK_LOG_FORMAT / POINTBOOK_LOG_LEVEL
//! libpointbook::logging::init_default();
//! ```

use std::str::FromStr;

/// Shape of the lines written to stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    /// One JSON object per event
    Json,
    Pretty,
}

impl LogFormat {
    pub const ALL: [LogFormat; 3] = [LogFormat::Text, LogFormat::Json, LogFormat::Pretty];

    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|f| f.as_str()).collect();
                format!("Invalid log format: '{}'. Expected one of: {}", s, names.join(", "))
            })
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for logging initialization
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    /// * `format` - Log output format (text, json, or pretty)
    /// * `level` - Minimum log level (error, warn, info, debug, trace)
    /// * `verbose` - If true, defaults to debug level
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    fn filter(&self) -> tracing_subscriber::EnvFilter {
        use tracing_subscriber::EnvFilter;

        let fallback = if self.verbose { "debug" } else { self.level.as_str() };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    }

    /// Install the global subscriber
    ///
    /// Calling this twice is harmless: the second subscriber is dropped.
    pub fn init(&self) {
        let filter = self.filter();

        let result = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .flatten_event(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .try_init(),
        };

        if result.is_err() {
            tracing::debug!("Logging already initialized");
        }
    }
}

/// Initialize logging with default settings
///
/// Respects `POINTBOOK_LOG_FORMAT` and `POINTBOOK_LOG_LEVEL`. Falls back to
/// text format at `warn` level.
pub fn init_default() {
    from_env(false).init();
}

/// Logging settings from the environment, with `verbose` forcing debug
pub fn from_env(verbose: bool) -> LoggingConfig {
    let format = std::env::var("POINTBOOK_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text);

    let level = std::env::var("POINTBOOK_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());

    LoggingConfig::new(format, level, verbose)
}
