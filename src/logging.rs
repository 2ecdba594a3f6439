//! Logging infrastructure - structured tracing across the bridge
//!
//! Design: `tracing` for structured, contextual logging with:
//! - Zero-cost when disabled (hot paths only emit `trace!`)
//! - One global subscriber installed at most once
//! - Console or file output, pretty/compact/JSON formats

use once_cell::sync::OnceCell;
use parking_lot::{const_mutex, Mutex};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

// Re-export tracing macros for use throughout the crate
pub use tracing::{debug, error, info, trace, warn};

use crate::object::Ownership;

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Keeps the non-blocking writer alive until `shutdown`
static WORKER_GUARD: Mutex<Option<WorkerGuard>> = const_mutex(None);

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format with timestamps
    #[default]
    Pretty,
    /// Compact format for production
    Compact,
    /// JSON format for structured logging
    Json,
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogOutput {
    Stdout,
    #[default]
    Stderr,
    /// Single file, appended to
    File(PathBuf),
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Show span events (new/close)
    pub span_events: bool,
    /// Extra filter directives (e.g. "engine_bridge::object=trace")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Verbose config for debugging binding mismatches
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            format: LogFormat::Pretty,
            output: LogOutput::Stderr,
            span_events: true,
            filter: None,
        }
    }

    /// Minimal logging
    pub fn performance() -> Self {
        Self {
            level: Level::ERROR,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

/// Parse a level name, falling back to INFO
pub fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with custom configuration (idempotent)
///
/// A subscriber installed by the host application wins; ours is then skipped.
pub fn init_with_config(config: &LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = build_filter(config);
        let span_events = span_events_config(config.span_events);

        let (writer, guard) = match &config.output {
            LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
            LogOutput::File(path) => {
                let directory = path
                    .parent()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."));
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "engine_bridge.log".to_string());
                tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name))
            }
        };

        let layer = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_writer(writer)
                .pretty()
                .with_span_events(span_events)
                .with_filter(filter)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .with_writer(writer)
                .compact()
                .with_span_events(span_events)
                .with_filter(filter)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .with_writer(writer)
                .json()
                .with_span_events(span_events)
                .with_filter(filter)
                .boxed(),
        };

        if tracing_subscriber::registry().with(layer).try_init().is_ok() {
            *WORKER_GUARD.lock() = Some(guard);
        }
    });
}

/// Initialize logging from `ENGINE_BRIDGE_*` environment variables
pub fn init() {
    init_with_config(&crate::config::BridgeConfig::from_env().logging.to_log_config());
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

/// Flush pending log lines (drops the writer guard)
pub fn shutdown() {
    WORKER_GUARD.lock().take();
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "engine_bridge={}",
            config.level.as_str().to_lowercase()
        ))
    });

    match &config.filter {
        Some(directives) => directives
            .split(',')
            .filter(|d| !d.trim().is_empty())
            .fold(base, |filter, directive| match directive.trim().parse() {
                Ok(parsed) => filter.add_directive(parsed),
                Err(_) => filter,
            }),
        None => base,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

// ============================================================================
// Bridge-specific logging functions
// ============================================================================

/// Log a managed wrapper tied to its native handle
#[inline]
pub fn log_handle_tied(class: &str, handle: usize, ownership: Ownership, pre_tied: bool) {
    debug!(
        event = "handle_tied",
        class,
        handle,
        ownership = ?ownership,
        pre_tied,
        "Managed wrapper tied to native handle"
    );
}

/// Log the single native release of a handle
#[inline]
pub fn log_handle_released(class: &str, handle: usize, ownership: Ownership, finalizer: bool) {
    debug!(
        event = "handle_released",
        class,
        handle,
        ownership = ?ownership,
        finalizer,
        "Native handle released"
    );
}

/// Log a variant resource release
#[inline]
pub fn log_variant_released(kind: &str, token: u64) {
    trace!(event = "variant_released", kind, token, "Variant resource released");
}

/// Log a signal dispatch
#[inline]
pub fn log_signal_dispatch(class: &str, signal: &str, argc: usize, delegates: usize) {
    trace!(
        event = "signal_dispatch",
        class,
        signal,
        args = argc,
        delegates,
        "Signal dispatched"
    );
}

/// Log a fault swallowed on the finalizer path
pub fn log_finalizer_fault(class: &str, detail: &str) {
    warn!(
        event = "finalizer_fault",
        class,
        detail,
        "Fault suppressed during finalizer-driven disposal"
    );
}

/// Log a resource still alive at shutdown
pub fn log_leak(token: u64, description: &str) {
    warn!(
        event = "leak",
        token,
        description,
        "Native resource was never disposed"
    );
}

/// Log bridge initialization
pub fn log_bridge_init() {
    info!(event = "bridge_init", "Engine bridge initializing");
}

/// Log bridge shutdown
pub fn log_bridge_shutdown(leaked: usize) {
    info!(
        event = "bridge_shutdown",
        leaked,
        "Engine bridge shutting down"
    );
}
