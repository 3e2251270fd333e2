//! Diagnostics for the synchronization engine.
//!
//! Every transition, skip and backend failure is reported as a `LogEntry`
//! tagged with the component that produced it ("galaxy3d::SyncEngine",
//! "galaxy3d::GeometryCache", "galaxy3d::SourceScene"). Entries go to one
//! replaceable `Logger`; the default one prints colored lines to the console.
//!
//! The logger is the only process-wide state of the crate.

use colored::*;
use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;
use chrono::{DateTime, Local};

/// Active logger, `DefaultLogger` until replaced
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Receiver of sync diagnostics
///
/// Implement it to forward entries to the host application's console, a
/// file, or a test capture.
///
/// # Example
///
/// ```no_run
/// use galaxy_3d_scene_sync::galaxy3d::log::{Logger, LogEntry};
///
/// struct HostConsoleLogger;
///
/// impl Logger for HostConsoleLogger {
///     fn log(&self, entry: &LogEntry) {
///         eprintln!("{}: {}", entry.source, entry.message);
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    /// Handle one entry. Called with the logger slot read-locked.
    fn log(&self, entry: &LogEntry);
}

/// One diagnostic
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: LogSeverity,

    /// When the entry was emitted
    pub timestamp: SystemTime,

    /// Emitting component, e.g. "galaxy3d::SyncEngine"
    pub source: String,

    pub message: String,

    /// Emitting file, set by `engine_error!`
    pub file: Option<&'static str>,

    /// Emitting line, set by `engine_error!`
    pub line: Option<u32>,
}

/// Severity of a `LogEntry`, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    /// Per-call tracing of backend traffic
    Trace,

    /// State machine transitions
    Debug,

    /// Engine lifecycle
    Info,

    /// Skipped objects and recoverable problems
    Warn,

    /// Invariant violations and backend failures
    Error,
}

impl LogSeverity {
    /// Fixed-width label used by `DefaultLogger`
    pub fn label(self) -> &'static str {
        match self {
            LogSeverity::Trace => "TRACE",
            LogSeverity::Debug => "DEBUG",
            LogSeverity::Info => "INFO ",
            LogSeverity::Warn => "WARN ",
            LogSeverity::Error => "ERROR",
        }
    }
}

/// Console logger
///
/// Prints `[time] [SEVERITY] [source] message`, followed by `(file:line)`
/// when the entry carries a location. Warnings and errors go to stderr,
/// everything else to stdout.
pub struct DefaultLogger;

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let time: DateTime<Local> = entry.timestamp.into();
        let label = entry.severity.label();
        let severity = match entry.severity {
            LogSeverity::Trace => label.bright_black(),
            LogSeverity::Debug => label.cyan(),
            LogSeverity::Info => label.green(),
            LogSeverity::Warn => label.yellow(),
            LogSeverity::Error => label.red().bold(),
        };
        let location = match (entry.file, entry.line) {
            (Some(file), Some(line)) => format!(" ({}:{})", file, line),
            _ => String::new(),
        };
        let line = format!(
            "[{}] [{}] [{}] {}{}",
            time.format("%H:%M:%S%.3f"),
            severity,
            entry.source.bright_blue(),
            entry.message,
            location,
        );

        if entry.severity >= LogSeverity::Warn {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}

// ===== LOGGER SLOT =====

fn logger_slot() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

/// Replace the process-wide logger
///
/// # Example
///
/// ```no_run
/// use galaxy_3d_scene_sync::galaxy3d::log::{self, Logger, LogEntry};
///
/// struct Silent;
/// impl Logger for Silent {
///     fn log(&self, _entry: &LogEntry) {}
/// }
///
/// log::set_logger(Silent);
/// ```
pub fn set_logger<L: Logger + 'static>(logger: L) {
    if let Ok(mut lock) = logger_slot().write() {
        *lock = Box::new(logger);
    }
}

/// Put `DefaultLogger` back
pub fn reset_logger() {
    if let Ok(mut lock) = logger_slot().write() {
        *lock = Box::new(DefaultLogger);
    }
}

fn dispatch(entry: LogEntry) {
    if let Ok(lock) = logger_slot().read() {
        lock.log(&entry);
    }
}

/// Emit an entry without location. Entry point of the `engine_*!` macros.
pub fn log(severity: LogSeverity, source: &str, message: String) {
    dispatch(LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: source.to_string(),
        message,
        file: None,
        line: None,
    });
}

/// Emit an entry with its file and line. Entry point of `engine_error!`.
pub fn log_detailed(
    severity: LogSeverity,
    source: &str,
    message: String,
    file: &'static str,
    line: u32,
) {
    dispatch(LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: source.to_string(),
        message,
        file: Some(file),
        line: Some(line),
    });
}

// ===== LOGGING MACROS =====

/// Log a TRACE message (backend call tracing)
///
/// # Example
///
/// ```ignore
/// engine_trace!("galaxy3d::SyncEngine", "create_submesh for {:?}", key);
/// ```
#[macro_export]
macro_rules! engine_trace {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log(
            $crate::log::LogSeverity::Trace,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a DEBUG message (transitions)
///
/// # Example
///
/// ```ignore
/// engine_debug!("galaxy3d::SyncEngine", "Realized {:?} as prototype", key);
/// ```
#[macro_export]
macro_rules! engine_debug {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log(
            $crate::log::LogSeverity::Debug,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an INFO message (important events)
#[macro_export]
macro_rules! engine_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log(
            $crate::log::LogSeverity::Info,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a WARN message (skipped objects)
///
/// # Example
///
/// ```ignore
/// engine_warn!("galaxy3d::SyncEngine", "Skipping {:?}: {}", key, reason);
/// ```
#[macro_export]
macro_rules! engine_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log(
            $crate::log::LogSeverity::Warn,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an ERROR message with file:line information
#[macro_export]
macro_rules! engine_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log_detailed(
            $crate::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        )
    };
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
