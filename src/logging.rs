//! kanban-sync logging
//!
//! Structured logging on top of `tracing`. Console output goes to stderr so
//! that board renderings on stdout stay machine-readable.

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level to output
    pub level: Level,
    /// Enable colored output
    pub color: bool,
    pub show_timestamps: bool,
    /// Show target/module name
    pub show_target: bool,
    /// JSON lines for machine parsing
    pub json_format: bool,
    pub enable_spans: bool,
    /// Write to this file instead of stderr
    pub file_output: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            color: true,
            show_timestamps: false,
            show_target: false,
            json_format: false,
            enable_spans: false,
            file_output: None,
        }
    }
}

impl LoggingConfig {
    pub fn for_mode(mode: ApplicationMode) -> Self {
        match mode {
            ApplicationMode::Cli => Self {
                level: Level::WARN,
                color: true,
                show_timestamps: false,
                show_target: false,
                json_format: false,
                enable_spans: false,
                file_output: None,
            },
            // long-running; every remote event is worth a line
            ApplicationMode::Watch => Self {
                level: Level::INFO,
                color: false,
                show_timestamps: true,
                show_target: true,
                json_format: false,
                enable_spans: true,
                file_output: None,
            },
            ApplicationMode::Test => Self {
                level: Level::DEBUG,
                color: false,
                show_timestamps: true,
                show_target: true,
                json_format: false,
                enable_spans: true,
                file_output: None,
            },
        }
    }

    /// Create config from CLI arguments
    pub fn from_args(quiet: bool, verbose: bool, json: bool) -> Self {
        let level = if verbose {
            Level::DEBUG
        } else if quiet {
            Level::ERROR
        } else {
            Level::WARN
        };

        Self {
            level,
            color: !quiet && !json && io::stderr().is_terminal(),
            show_timestamps: verbose || json,
            show_target: verbose,
            json_format: json,
            enable_spans: verbose,
            file_output: None,
        }
    }

    pub fn with_file(mut self, path: Option<PathBuf>) -> Self {
        self.file_output = path;
        self
    }
}

/// Application modes with different logging requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationMode {
    /// One-shot commands: quiet unless something goes wrong
    Cli,
    /// `kb watch`: follows the live feed
    Watch,
    /// Maximum detail for tests
    Test,
}

impl ApplicationMode {
    fn file_stem(&self) -> &'static str {
        match self {
            ApplicationMode::Cli => "cli",
            ApplicationMode::Watch => "watch",
            ApplicationMode::Test => "test",
        }
    }
}

/// Initialize the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: LoggingConfig) -> io::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kanban_sync={}", config.level)));

    let registry = Registry::default().with(env_filter);

    if let Some(log_file) = config.file_output {
        let file_appender = tracing_appender::rolling::never(
            log_file.parent().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file path")
            })?,
            log_file.file_name().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file name")
            })?,
        );

        if config.json_format {
            fmt::layer()
                .json()
                .with_current_span(config.enable_spans)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(file_appender)
                .with_subscriber(registry)
                .try_init()
                .map_err(|e| io::Error::other(e.to_string()))?;
        } else {
            fmt::layer()
                .with_target(config.show_target)
                .with_level(true)
                .with_ansi(false)
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_writer(file_appender)
                .with_subscriber(registry)
                .try_init()
                .map_err(|e| io::Error::other(e.to_string()))?;
        }
    } else if config.json_format {
        fmt::layer()
            .json()
            .with_current_span(config.enable_spans)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(io::stderr)
            .with_subscriber(registry)
            .try_init()
            .map_err(|e| io::Error::other(e.to_string()))?;
    } else {
        let fmt_layer = fmt::layer()
            .with_target(config.show_target)
            .with_level(true)
            .with_ansi(config.color)
            .with_writer(io::stderr);

        let result = if config.show_timestamps {
            fmt_layer
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_subscriber(registry)
                .try_init()
        } else {
            fmt_layer.without_time().with_subscriber(registry).try_init()
        };
        result.map_err(|e| io::Error::other(e.to_string()))?;
    }

    Ok(())
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Build a config from `KANBAN_LOG_JSON`, `KANBAN_LOG_VERBOSE` and `KANBAN_LOG_QUIET`
pub fn config_from_env() -> LoggingConfig {
    LoggingConfig::from_args(
        env_flag("KANBAN_LOG_QUIET"),
        env_flag("KANBAN_LOG_VERBOSE"),
        env_flag("KANBAN_LOG_JSON"),
    )
}

pub fn init_from_env() -> io::Result<()> {
    init_logging(config_from_env())
}

/// Remove rotated log files (`*.log.<suffix>`) older than `retention_days`
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> io::Result<usize> {
    use std::fs;
    use std::time::{Duration, SystemTime};

    if !log_dir.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let retention = Duration::from_secs(retention_days as u64 * 24 * 60 * 60);
    let mut cleaned = 0;

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        if !path.to_string_lossy().contains(".log.") || !path.is_file() {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };
        if age <= retention {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                cleaned += 1;
                tracing::debug!(path = %path.display(), "Removed old log file");
            },
            Err(e) => {
                tracing::warn!("Failed to remove old log file {}: {}", path.display(), e);
            },
        }
    }

    if cleaned > 0 {
        tracing::info!("Log cleanup removed {} files", cleaned);
    }
    Ok(cleaned)
}

/// Default log file location for a mode, under `~/.kanban-sync/logs`
pub fn log_file_path(mode: ApplicationMode) -> Option<PathBuf> {
    let log_dir = dirs::home_dir()?.join(".kanban-sync").join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;
    Some(log_dir.join(format!("{}.log", mode.file_stem())))
}

/// Log one board operation at a stage of its lifecycle
#[macro_export]
macro_rules! log_board_operation {
    ($operation:expr, $stage:expr) => {
        tracing::debug!(operation = $operation, stage = $stage, "Board operation");
    };
    ($operation:expr, $stage:expr, $details:expr) => {
        tracing::debug!(
            operation = $operation,
            stage = $stage,
            details = %$details,
            "Board operation"
        );
    };
}

/// Log a rollback after the gateway rejected an optimistic change
#[macro_export]
macro_rules! log_rollback {
    ($operation:expr, $error:expr) => {
        tracing::warn!(
            operation = $operation,
            error = %$error,
            "Gateway rejected change, rolled back"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_from_args_levels() {
        assert_eq!(LoggingConfig::from_args(false, true, false).level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_args(true, false, false).level, Level::ERROR);
        assert_eq!(LoggingConfig::from_args(false, false, false).level, Level::WARN);

        let json = LoggingConfig::from_args(false, false, true);
        assert!(json.json_format);
        assert!(!json.color);
        assert!(json.show_timestamps);
    }

    #[test]
    fn test_mode_presets() {
        let watch = LoggingConfig::for_mode(ApplicationMode::Watch);
        assert_eq!(watch.level, Level::INFO);
        assert!(watch.show_timestamps);
        assert_eq!(
            LoggingConfig::for_mode(ApplicationMode::Test).level,
            Level::DEBUG
        );
    }

    #[test]
    fn test_cleanup_only_touches_rotated_files() {
        let dir = tempfile::tempdir().unwrap();
        let rotated = dir.path().join("watch.log.2020-01-01");
        let current = dir.path().join("watch.log");
        File::create(&rotated).unwrap();
        File::create(&current).unwrap();

        let old = SystemTime::now() - Duration::from_secs(30 * 24 * 60 * 60);
        File::options()
            .write(true)
            .open(&rotated)
            .unwrap()
            .set_modified(old)
            .unwrap();
        File::options()
            .write(true)
            .open(&current)
            .unwrap()
            .set_modified(old)
            .unwrap();

        let removed = cleanup_old_logs(dir.path(), 7).unwrap();
        assert_eq!(removed, 1);
        assert!(!rotated.exists());
        assert!(current.exists());
        fs::remove_file(current).unwrap();
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_old_logs(&dir.path().join("nope"), 7).unwrap(), 0);
    }
}
