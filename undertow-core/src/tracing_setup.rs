//! Tracing setup for Undertow
//!
//! Console logs follow the user's chosen level while a full trace of the last
//! run is written to disk, so fallback decisions can be reconstructed after
//! the fact without cluttering the terminal.

use std::fs::{File, create_dir_all};
use std::path::Path;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::UndertowError;

/// Environment variable that replaces the console filter entirely.
pub const LOG_ENV_VAR: &str = "UNDERTOW_LOG";

/// HTTP client internals only matter when a probe misbehaves.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

/// Console filter directives for `level`.
///
/// Session decisions (`undertow_core::playback`) are shown at least at info
/// so fallbacks stay visible. The HTTP stack is capped at warn.
pub fn console_directives(level: Level) -> String {
    let playback = if level < Level::INFO { Level::INFO } else { level };
    let mut directives = vec![
        level.to_string().to_lowercase(),
        format!("undertow_core::playback={}", playback.to_string().to_lowercase()),
    ];
    directives.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
    directives.join(",")
}

/// File filter directives: everything from Undertow, HTTP internals at info.
pub fn file_directives() -> String {
    std::iter::once("trace".to_string())
        .chain(QUIET_TARGETS.iter().map(|target| format!("{target}=info")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize tracing with dual output: console (user level) + file (full trace)
///
/// The console filter comes from `UNDERTOW_LOG` when set, otherwise from
/// [`console_directives`].
///
/// # Errors
///
/// - `UndertowError::Io` - If the logs directory or log file cannot be created
/// - `UndertowError::Configuration` - If a global subscriber is already installed
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<(), UndertowError> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_path)?;

    let log_file_path = logs_path.join("undertow-last-run.log");
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(console_directives(console_level)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new(file_directives()));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|error| UndertowError::Configuration {
            reason: format!("tracing already initialized: {error}"),
        })?;

    tracing::info!(
        console = %console_level,
        trace_file = %log_file_path.display(),
        "Tracing initialized"
    );

    Ok(())
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Informational, warning, and error messages
    Info,
    /// Debug, informational, warning, and error messages
    Debug,
    /// All messages including per-event surface traces
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use undertow_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::str::FromStr for CliLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(CliLogLevel::Error),
            "warn" => Ok(CliLogLevel::Warn),
            "info" => Ok(CliLogLevel::Info),
            "debug" => Ok(CliLogLevel::Debug),
            "trace" => Ok(CliLogLevel::Trace),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliLogLevel::Error => write!(f, "error"),
            CliLogLevel::Warn => write!(f, "warn"),
            CliLogLevel::Info => write!(f, "info"),
            CliLogLevel::Debug => write!(f, "debug"),
            CliLogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_keeps_playback_decisions_visible() {
        let directives = console_directives(Level::WARN);

        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("undertow_core::playback=info"));
        assert!(directives.contains("reqwest=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_verbose_console_is_not_capped() {
        let directives = console_directives(Level::TRACE);

        assert!(directives.contains("undertow_core::playback=trace"));
        assert!(directives.contains("hyper=warn"));
    }

    #[test]
    fn test_file_directives_parse() {
        let directives = file_directives();

        assert!(directives.starts_with("trace,"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_unwritable_logs_dir_is_io_error() {
        let blocker = std::env::temp_dir().join(format!("undertow-logs-{}", std::process::id()));
        std::fs::write(&blocker, b"not a directory").unwrap();

        let error = init_tracing(Level::WARN, Some(&blocker.join("nested"))).unwrap_err();
        std::fs::remove_file(&blocker).unwrap();

        assert!(matches!(error, UndertowError::Io(_)));
    }

    #[test]
    fn test_log_level_parsing_is_case_insensitive() {
        assert_eq!("WARN".parse::<CliLogLevel>(), Ok(CliLogLevel::Warn));
        assert_eq!("trace".parse::<CliLogLevel>(), Ok(CliLogLevel::Trace));
        assert!("verbose".parse::<CliLogLevel>().is_err());
    }

    #[test]
    fn test_log_level_display_round_trips() {
        for level in [CliLogLevel::Error, CliLogLevel::Debug] {
            assert_eq!(level.to_string().parse::<CliLogLevel>(), Ok(level));
        }
    }
}
