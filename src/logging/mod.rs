//! Logging system initialization and configuration
//!
//! The task engine itself only emits `tracing` events. Embedding applications
//! that do not install their own subscriber can call [`init_logging`], which
//! supports:
//! - Environment variable override (JBOOT_LOG)
//! - File output with daily rotation
//! - Console output in pretty, compact or JSON format

use crate::error::LoggingError;
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment variable overriding the log filter
pub const LOG_ENV_VAR: &str = "JBOOT_LOG";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default log level
    pub level: Level,
    /// Console output format
    pub format: LogFormat,
    /// Show timestamps
    pub timestamps: bool,
    /// Show worker thread names
    pub thread_names: bool,
    /// Enable file output
    pub file_output: bool,
    /// Log file directory path
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            timestamps: true,
            thread_names: true,
            file_output: false,
            file_path: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Get the default log directory path
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jboot")
        .join("logs")
}

/// Build the filter from `JBOOT_LOG`, falling back to the configured level
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(format!("jboot={}", config.level.as_str().to_lowercase())))
}

/// Initialize the global tracing subscriber
///
/// Fails if the log directory cannot be created or a global subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_names(config.thread_names);

    let console_layer = match (config.format, config.timestamps) {
        (LogFormat::Json, _) => console_layer.json().boxed(),
        (LogFormat::Compact, true) => console_layer.compact().boxed(),
        (LogFormat::Compact, false) => console_layer.compact().without_time().boxed(),
        (LogFormat::Pretty, true) => console_layer.boxed(),
        (LogFormat::Pretty, false) => console_layer.without_time().boxed(),
    };

    let file_layer = if config.file_output {
        let log_dir = config.file_path.clone().unwrap_or_else(default_log_dir);
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "jboot.log");
        let file_layer = fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE);

        Some(file_layer.boxed())
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    tracing::debug!(
        level = %config.level,
        format = ?config.format,
        file_output = config.file_output,
        "Logging initialized"
    );

    Ok(())
}

/// Parse log level from string
pub fn parse_level(s: &str) -> Level {
    match s.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
