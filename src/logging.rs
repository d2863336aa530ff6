//! Logging setup
//!
//! Process-wide subscriber for the `tracing` events the driver emits. The
//! library itself never installs anything; binaries call [`init`] (or
//! [`init_from_config`]) once at startup. Provides:
//! - Multiple output formats (pretty, compact, JSON) on stderr
//! - An optional size-rotated log file next to the console output
//!   (`k2600.log`, `k2600.log.1`, ... up to the configured backup count)
//! - Environment-based filtering (`RUST_LOG` wins over the configured level)
//!
//! # Example
//! ```no_run
//! use k2600_probecard::logging::{self, LoggingConfig};
//! use tracing::Level;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! logging::init(LoggingConfig::new(Level::DEBUG).with_log_file("k2600.log"))?;
//! tracing::info!("Application started");
//! # Ok(())
//! # }
//! ```

use crate::config::{AppConfig, LogFormat};
use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Default size at which the log file is rotated (5 MiB).
pub const DEFAULT_LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
/// Default number of rotated files kept next to the active one.
pub const DEFAULT_LOG_BACKUPS: usize = 5;

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Level,
    /// Console output format
    pub format: LogFormat,
    /// Whether to include span events (NEW, CLOSE)
    pub with_span_events: bool,
    /// Whether to include file and line numbers
    pub with_file_and_line: bool,
    /// Whether to enable ANSI colors on the console
    pub with_ansi: bool,
    /// Append a plain-text copy of every event to this file
    pub log_file: Option<PathBuf>,
    /// Rotate the log file once it grows past this many bytes
    pub max_bytes: u64,
    /// Rotated files to keep
    pub backups: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            with_span_events: false,
            with_file_and_line: false,
            with_ansi: true,
            log_file: None,
            max_bytes: DEFAULT_LOG_MAX_BYTES,
            backups: DEFAULT_LOG_BACKUPS,
        }
    }
}

impl LoggingConfig {
    /// Create logging config from the application configuration
    pub fn from_app_config(config: &AppConfig) -> Result<Self, String> {
        let level = parse_log_level(&config.application.log_level)?;

        Ok(Self {
            level,
            format: config.application.log_format,
            log_file: config.application.log_file.clone(),
            max_bytes: config.application.log_max_bytes,
            backups: config.application.log_backups,
            ..Default::default()
        })
    }

    /// Create logging config with custom settings
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set output format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable span events
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// Include source file and line number in every event
    pub fn with_file_and_line(mut self, enabled: bool) -> Self {
        self.with_file_and_line = enabled;
        self
    }

    /// Enable or disable ANSI colors
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }

    /// Also write events to `path`
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Rotation policy of the log file
    pub fn with_rotation(mut self, max_bytes: u64, backups: usize) -> Self {
        self.max_bytes = max_bytes;
        self.backups = backups;
        self
    }
}

/// Size-rotated log file that flushes after every event.
struct RotatingLog(FileRotate<AppendCount>);

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.0.write(buf)?;
        self.0.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

fn file_layer(
    path: &Path,
    max_bytes: u64,
    backups: usize,
    span_events: FmtSpan,
) -> Result<BoxedLayer, String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create log directory {}: {}", parent.display(), e))?;
    }
    // Surface permission and path errors here rather than on the first event.
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))?;

    let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX);
    let file = FileRotate::new(
        path,
        AppendCount::new(backups),
        ContentLimit::BytesSurpassed(limit),
        Compression::None,
        #[cfg(unix)]
        None,
    );

    Ok(fmt::layer()
        .with_writer(Mutex::new(RotatingLog(file)))
        .with_span_events(span_events)
        .with_ansi(false)
        .boxed())
}

/// Initialize logging from the application configuration
pub fn init_from_config(config: &AppConfig) -> Result<(), String> {
    init(LoggingConfig::from_app_config(config)?)
}

/// Initialize logging with custom configuration
///
/// This function is idempotent - if a subscriber is already installed, it will
/// return Ok(()) without error. This makes it safe to call in tests.
pub fn init(config: LoggingConfig) -> Result<(), String> {
    // Create env filter with default level
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_to_filter_string(config.level)));

    // Determine span events
    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);

    let console = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_span_events(span_events.clone())
            .with_file(config.with_file_and_line)
            .with_line_number(config.with_file_and_line)
            .with_ansi(config.with_ansi)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_span_events(span_events.clone())
            .with_file(config.with_file_and_line)
            .with_line_number(config.with_file_and_line)
            .with_ansi(config.with_ansi)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(span_events.clone())
            .with_file(config.with_file_and_line)
            .with_line_number(config.with_file_and_line)
            .boxed(),
    };
    layers.push(console);

    if let Some(path) = &config.log_file {
        layers.push(file_layer(
            path,
            config.max_bytes,
            config.backups,
            span_events,
        )?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .or_else(|e| {
            // Handle "already initialized" gracefully - this is expected in tests
            if e
                .to_string()
                .contains("a global default trace dispatcher has already been set")
            {
                Ok(())
            } else {
                Err(format!("Failed to initialize logging: {}", e))
            }
        })
}

/// Parse log level string into tracing Level
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}

/// Convert Level to env filter string
fn level_to_filter_string(level: Level) -> String {
    match level {
        Level::TRACE => "trace".to_string(),
        Level::DEBUG => "debug".to_string(),
        Level::INFO => "info".to_string(),
        Level::WARN => "warn".to_string(),
        Level::ERROR => "error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("trace"), Ok(Level::TRACE)));
        assert!(matches!(parse_log_level("debug"), Ok(Level::DEBUG)));
        assert!(matches!(parse_log_level("info"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("warn"), Ok(Level::WARN)));
        assert!(matches!(parse_log_level("error"), Ok(Level::ERROR)));

        // Case insensitive
        assert!(matches!(parse_log_level("INFO"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("Debug"), Ok(Level::DEBUG)));

        // Invalid
        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_logging_config_from_app_config() {
        let mut app = AppConfig::default();
        app.application.log_level = "debug".to_string();
        app.application.log_format = LogFormat::Json;
        app.application.log_file = Some(PathBuf::from("k2600.log"));
        app.application.log_max_bytes = 1_000_000;
        app.application.log_backups = 3;

        let config = LoggingConfig::from_app_config(&app).unwrap();
        assert_eq!(config.max_bytes, 1_000_000);
        assert_eq!(config.backups, 3);
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.log_file, Some(PathBuf::from("k2600.log")));
    }

    #[test]
    fn test_logging_config_rejects_bad_level() {
        let mut app = AppConfig::default();
        app.application.log_level = "chatty".to_string();
        assert!(LoggingConfig::from_app_config(&app).is_err());
    }

    #[test]
    fn test_logging_config_builder() {
        let config = LoggingConfig::new(Level::WARN)
            .with_format(LogFormat::Pretty)
            .with_span_events(true)
            .with_ansi(false)
            .with_file_and_line(true)
            .with_log_file("/tmp/k2600.log")
            .with_rotation(4096, 2);

        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.with_span_events);
        assert!(!config.with_ansi);
        assert!(config.with_file_and_line);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/k2600.log")));
        assert_eq!(config.max_bytes, 4096);
        assert_eq!(config.backups, 2);
    }

    #[test]
    fn test_default_rotation_policy() {
        let config = LoggingConfig::default();
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.backups, 5);
    }

    #[test]
    fn test_log_file_rotates_and_keeps_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k2600.log");
        let layer = file_layer(&path, 1024, 2, FmtSpan::NONE).unwrap();
        let subscriber = tracing_subscriber::registry().with(layer);

        let padding = "x".repeat(100);
        tracing::subscriber::with_default(subscriber, || {
            for i in 0..100 {
                tracing::info!("event {i:03} {padding}");
            }
        });

        let backup = |n: usize| dir.path().join(format!("k2600.log.{n}"));
        assert!(path.exists());
        assert!(backup(1).exists());
        assert!(backup(2).exists());
        assert!(!backup(3).exists());

        let active = std::fs::read_to_string(&path).unwrap();
        let newest = std::fs::read_to_string(backup(1)).unwrap();
        assert!(active.contains("event 099") || newest.contains("event 099"));
        // The oldest events were rotated out.
        let oldest = std::fs::read_to_string(backup(2)).unwrap();
        assert!(!active.contains("event 000"));
        assert!(!oldest.contains("event 000"));
    }

    #[test]
    fn test_log_file_in_missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("k2600.log");
        assert!(file_layer(&path, DEFAULT_LOG_MAX_BYTES, 1, FmtSpan::NONE).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_level_to_filter_string() {
        assert_eq!(level_to_filter_string(Level::TRACE), "trace");
        assert_eq!(level_to_filter_string(Level::ERROR), "error");
    }
}
