//! Unit tests for the global logging sink
//!
//! LOGGER is a process-wide OnceLock shared across all tests.
//! Tests that swap it are marked #[serial].

use crate::galaxy3d::Engine;
use crate::galaxy3d::log::{Logger, LogEntry, LogSeverity};
use std::sync::{Arc, Mutex};
use serial_test::serial;

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Test logger that captures log entries for verification
struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogger {
    fn new() -> (Self, Arc<Mutex<Vec<LogEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        (Self { entries: entries.clone() }, entries)
    }
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

/// Entries from one source; unit tests elsewhere in the crate log concurrently
fn only_from(entries: &Arc<Mutex<Vec<LogEntry>>>, source: &str) -> Vec<LogEntry> {
    entries.lock().unwrap().iter().filter(|e| e.source == source).cloned().collect()
}

// ============================================================================
// LOGGING TESTS
// ============================================================================

#[test]
#[serial]
fn test_set_logger_captures_macros() {
    let (logger, entries) = TestLogger::new();
    Engine::set_logger(logger);

    crate::engine_debug!("engine_tests::capture", "created root for {}", "outdoor");
    crate::engine_warn!("engine_tests::capture", "dropped {}", 3);

    Engine::reset_logger();

    let entries = only_from(&entries, "engine_tests::capture");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].severity, LogSeverity::Debug);
    assert_eq!(entries[0].message, "created root for outdoor");
    assert_eq!(entries[1].severity, LogSeverity::Warn);
    assert!(entries[1].file.is_none());
}

#[test]
#[serial]
fn test_error_macro_records_location() {
    let (logger, entries) = TestLogger::new();
    Engine::set_logger(logger);

    crate::engine_error!("engine_tests::location", "rejected {}", "rock_07");

    Engine::reset_logger();

    let entries = only_from(&entries, "engine_tests::location");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, LogSeverity::Error);
    assert!(entries[0].file.unwrap().ends_with("engine_tests.rs"));
    assert!(entries[0].line.is_some());
}

#[test]
#[serial]
fn test_reset_logger_detaches_custom_logger() {
    let (logger, entries) = TestLogger::new();
    Engine::set_logger(logger);
    Engine::reset_logger();

    Engine::log(LogSeverity::Info, "engine_tests::reset", "after reset".to_string());

    assert!(only_from(&entries, "engine_tests::reset").is_empty());
}
