/// Galaxy3D Engine - process-wide logging sink
///
/// Everything else in the visibility core is owned by an explicit
/// `SceneContext`; the logger is the one piece of global state, because
/// traversal workers log from rayon threads that have no handle to a scene.

use std::sync::OnceLock;
use std::time::SystemTime;
use parking_lot::RwLock;
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

// ===== INTERNAL STATE =====

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

fn logger() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger::default())))
}

// ===== PUBLIC API =====

/// Global logging entry point used by the `engine_*` macros
pub struct Engine;

impl Engine {
    /// Set a custom logger
    ///
    /// Replaces the default console logger. Affects every scene in the process.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use galaxy_3d_visibility::galaxy3d::Engine;
    /// use galaxy_3d_visibility::galaxy3d::log::{DefaultLogger, LogSeverity};
    ///
    /// Engine::set_logger(DefaultLogger::with_min_severity(LogSeverity::Warn));
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger_impl: L) {
        *logger().write() = Box::new(logger_impl);
    }

    /// Reset logger to default (DefaultLogger)
    pub fn reset_logger() {
        *logger().write() = Box::new(DefaultLogger::default());
    }

    /// Internal logging method (for simple logs without file:line)
    ///
    /// Used by engine_trace!, engine_debug!, engine_info!, engine_warn!.
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        logger().read().log(&LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: source.to_string(),
            message,
            file: None,
            line: None,
        });
    }

    /// Internal logging method with file:line information (for ERROR logs)
    ///
    /// Used by engine_error! macro to include source location.
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        logger().read().log(&LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: source.to_string(),
            message,
            file: Some(file),
            line: Some(line),
        });
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
