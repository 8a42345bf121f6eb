//! Tracing setup
//!
//! Structured logging for the action and generator crates, built on
//! `tracing-subscriber`:
//! - Multiple output formats (pretty, compact, JSON)
//! - `RUST_LOG` filtering, falling back to the configured level
//! - Span events for `action` spans, so each action execution is delimited
//!
//! # Example
//! ```no_run
//! use daq_sync::{config::SyncConfig, logging};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = SyncConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!(nap = ?config.action.nap, "Configuration loaded");
//! # Ok(())
//! # }
//! ```

use crate::config::SyncConfig;
use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

/// Output format for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed format with colors (for development)
    Pretty,
    /// Compact format without colors (for production)
    Compact,
    /// JSON format for structured logging (for log aggregation)
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!(
                "Invalid log format '{}'. Must be one of: pretty, compact, json",
                s
            )),
        }
    }
}

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
    /// Whether to log span creation and close
    pub with_span_events: bool,
    /// Whether to include file and line numbers
    pub with_file_and_line: bool,
    /// Whether to include thread names (generator and trigger threads are named)
    pub with_thread_names: bool,
    /// Whether to enable ANSI colors (only for Pretty format)
    pub with_ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Pretty,
            with_span_events: true,
            with_file_and_line: true,
            with_thread_names: true,
            with_ansi: true,
        }
    }
}

impl LogConfig {
    /// Create log config from the loaded configuration
    pub fn from_sync_config(config: &SyncConfig) -> Result<Self> {
        let level = parse_log_level(&config.application.log_level)?;
        let format = config
            .application
            .log_format
            .parse()
            .map_err(|e: String| anyhow!(e))?;
        Ok(Self {
            level,
            format,
            ..Default::default()
        })
    }

    /// Config at `level` with the remaining defaults.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Sets the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Logs span open/close events when enabled.
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// Enables ANSI colors.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Initialize tracing from the loaded configuration
pub fn init_from_config(config: &SyncConfig) -> Result<()> {
    init(LogConfig::from_sync_config(config)?)
}

/// Initialize tracing with custom configuration
///
/// Idempotent: if a global subscriber is already installed this returns
/// `Ok(())`, which makes it safe to call from tests.
pub fn init(config: LogConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let result = match config.format {
        OutputFormat::Pretty => {
            let layer = fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .with_file(config.with_file_and_line)
                .with_line_number(config.with_file_and_line)
                .with_thread_names(config.with_thread_names)
                .with_ansi(config.with_ansi)
                .with_filter(env_filter);
            tracing_subscriber::registry().with(layer).try_init()
        }
        OutputFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_span_events(span_events)
                .with_file(config.with_file_and_line)
                .with_line_number(config.with_file_and_line)
                .with_thread_names(config.with_thread_names)
                .with_ansi(false)
                .with_filter(env_filter);
            tracing_subscriber::registry().with(layer).try_init()
        }
        OutputFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_file(config.with_file_and_line)
                .with_line_number(config.with_file_and_line)
                .with_thread_names(config.with_thread_names)
                .with_filter(env_filter);
            tracing_subscriber::registry().with(layer).try_init()
        }
    };
    already_set_is_ok(result)
}

fn already_set_is_ok(result: Result<(), TryInitError>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        // Expected in tests and when several components initialise tracing
        Err(e) if e.to_string().contains("already") => Ok(()),
        Err(e) => Err(anyhow!("Failed to initialize tracing: {}", e)),
    }
}

/// Parse log level string into tracing Level
fn parse_log_level(level: &str) -> Result<Level> {
    level.parse::<Level>().map_err(|_| {
        anyhow!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
        assert_eq!(parse_log_level("INFO").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("Debug").unwrap(), Level::DEBUG);
        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_log_config_from_sync_config() {
        let mut config = SyncConfig::default();
        config.application.log_level = "warn".into();
        config.application.log_format = "json".into();

        let log = LogConfig::from_sync_config(&config).unwrap();
        assert_eq!(log.level, Level::WARN);
        assert_eq!(log.format, OutputFormat::Json);
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LogConfig::new(Level::WARN)
            .with_format(OutputFormat::Compact)
            .with_span_events(false)
            .with_ansi(false);
        assert!(init(config.clone()).is_ok());
        assert!(init(config).is_ok());
    }
}
