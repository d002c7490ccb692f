//! Centralized logging configuration for the Skyshare binaries
//!
//! Every auth, refresh and dispatch outcome is reported as a structured
//! `tracing` event; this module decides how those events are rendered.
//!
//! - `SKYSHARE_LOG_FORMAT`: `text` (default), `json` or `pretty`
//! - `SKYSHARE_LOG_LEVEL`: minimum level when `RUST_LOG` is not set
//!
//! ```no_run
//! use libskyshare::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "info".to_string(), false).init();
//!
//! // Or pick everything up from the environment
//! libskyshare::logging::LoggingConfig::from_env(false).init();
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// sqlx logs every statement at info; keep it quiet unless asked.
const QUIET_DEPENDENCIES: &str = "sqlx=warn,hyper=warn,reqwest=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text output (no colors, for piping)
    Text,
    /// Machine-parseable JSON (one JSON object per line)
    Json,
    /// Pretty-printed with colors (for development)
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    /// Create a new logging configuration
    ///
    /// `verbose` forces the `debug` level regardless of `level`.
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Read `SKYSHARE_LOG_FORMAT` and `SKYSHARE_LOG_LEVEL`
    ///
    /// Unknown formats fall back to text.
    pub fn from_env(verbose: bool) -> Self {
        let format = std::env::var("SKYSHARE_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);

        let level = std::env::var("SKYSHARE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Self::new(format, level, verbose)
    }

    /// Filter directives applied when `RUST_LOG` is unset
    pub fn directives(&self) -> String {
        let level = if self.verbose { "debug" } else { self.level.as_str() };
        format!("{},{}", level, QUIET_DEPENDENCIES)
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()))
    }

    /// Initialize logging, ignoring a subscriber that is already installed
    pub fn init(&self) {
        if let Err(e) = self.try_init() {
            eprintln!("logging already initialized: {}", e);
        }
    }

    /// Initialize logging with the configured settings
    ///
    /// All output goes to stderr so stdout stays free for command output.
    pub fn try_init(&self) -> Result<(), String> {
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
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .try_init(),
        };

        result.map_err(|e| e.to_string())
    }
}
