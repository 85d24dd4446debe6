//! Logging and tracing setup for the collector
//!
//! Console output always goes to stderr. When JSON logging is enabled, a
//! second layer writes structured records to a daily rolling file so a
//! collector run can be attached to a bug report.

use std::path::PathBuf;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::LogSettings;

/// File name prefix for the rolling JSON log
const LOG_FILE_NAME: &str = "dbmon.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory where JSON log files are written
    pub log_dir: PathBuf,

    /// Whether to write JSON records to `log_dir`
    pub enable_json_logs: bool,

    /// Whether to include file/line information in console output
    pub include_location: bool,

    /// Whether to log span open/close events
    pub enable_spans: bool,

    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            enable_json_logs: false,
            include_location: cfg!(debug_assertions),
            enable_spans: false,
            default_filter: LogSettings::default().filter,
        }
    }
}

impl LoggingConfig {
    /// Build from the `[logging]` section, with an optional CLI filter override
    pub fn from_settings(settings: &LogSettings, filter_override: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            log_dir: settings.log_dir.clone().unwrap_or(defaults.log_dir),
            enable_json_logs: settings.json,
            default_filter: filter_override
                .map(str::to_string)
                .unwrap_or_else(|| settings.filter.clone()),
            ..defaults
        }
    }
}

/// Install the global subscriber
///
/// The returned guard flushes the JSON writer when dropped, so hold it until
/// the process exits. Fails if a global subscriber is already installed.
pub fn init(config: LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    // RUST_LOG takes precedence over the configured filter
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .with_context(|| format!("Invalid log filter: {}", config.default_filter))?;

    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();
    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(span_events.clone())
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone())
        .boxed();
    layers.push(console_layer);

    let mut guard = None;
    if config.enable_json_logs {
        std::fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("Failed to create log directory: {:?}", config.log_dir)
        })?;
        let file_appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_NAME);
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter)
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        log_dir = %config.log_dir.display(),
        json_enabled = config.enable_json_logs,
        "Logging system initialized"
    );

    Ok(guard)
}
