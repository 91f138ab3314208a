//! Unit tests for log.rs
//!
//! Tests LogSeverity, LogEntry, DefaultLogger, MemoryLogger and the error
//! helper macros.

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger, MemoryLogger};
use serial_test::serial;
use std::time::SystemTime;

fn entry(severity: LogSeverity, message: &str) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "galaxy3d::test".to_string(),
        message: message.to_string(),
        file: None,
        line: None,
    }
}

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_labels_are_fixed_width() {
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        assert_eq!(severity.label().len(), 5);
    }
}

// ============================================================================
// LOGGER TESTS
// ============================================================================

#[test]
fn test_default_logger_does_not_panic() {
    let logger = DefaultLogger::new(LogSeverity::Trace);
    logger.log(&entry(LogSeverity::Info, "plain"));
    logger.log(&LogEntry {
        file: Some("heap.rs"),
        line: Some(12),
        ..entry(LogSeverity::Error, "detailed")
    });
}

#[test]
fn test_default_logger_filters_below_minimum() {
    // Nothing observable besides stdout, only check the filter path runs
    let logger = DefaultLogger::new(LogSeverity::Error);
    logger.log(&entry(LogSeverity::Trace, "dropped"));
}

#[test]
fn test_memory_logger_captures_entries() {
    let logger = MemoryLogger::new();
    logger.log(&entry(LogSeverity::Warn, "first"));
    logger.log(&entry(LogSeverity::Error, "second"));

    assert_eq!(logger.entries().len(), 2);
    assert_eq!(logger.count(LogSeverity::Error), 1);
    assert!(logger.contains("sec"));
    assert!(!logger.contains("third"));

    logger.clear();
    assert!(logger.entries().is_empty());
}

#[test]
fn test_memory_logger_clones_share_storage() {
    let logger = MemoryLogger::new();
    let handle = logger.clone();
    logger.log(&entry(LogSeverity::Info, "shared"));
    assert_eq!(handle.entries().len(), 1);
}

// ============================================================================
// ERROR MACROS
// ============================================================================

/// Entries logged by these tests only (other tests log concurrently)
fn own_entries(logger: &MemoryLogger, severity: LogSeverity) -> Vec<LogEntry> {
    logger
        .entries()
        .into_iter()
        .filter(|e| e.source == "galaxy3d::test" && e.severity == severity)
        .collect()
}

fn bail_helper(fail: bool) -> Result<u32> {
    if fail {
        crate::engine_bail!("galaxy3d::test", "bail with {}", 42);
    }
    Ok(7)
}

#[test]
#[serial]
fn test_engine_err_logs_with_location() {
    let logger = MemoryLogger::new();
    Engine::set_logger(logger.clone());

    let err = crate::engine_err!("galaxy3d::test", "bad thing {}", 1);
    assert_eq!(err, Error::BackendError("bad thing 1".to_string()));

    let entries = own_entries(&logger, LogSeverity::Error);
    assert_eq!(entries.len(), 1);
    assert!(entries[0].file.is_some());
    assert!(entries[0].line.is_some());

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_engine_bail_returns_early() {
    let logger = MemoryLogger::new();
    Engine::set_logger(logger.clone());

    assert_eq!(bail_helper(false), Ok(7));
    assert!(matches!(bail_helper(true), Err(Error::BackendError(msg)) if msg == "bail with 42"));
    assert_eq!(own_entries(&logger, LogSeverity::Error).len(), 1);

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_engine_warn_err_logs_at_warn() {
    let logger = MemoryLogger::new();
    Engine::set_logger(logger.clone());

    let _ = crate::engine_warn_err!("galaxy3d::test", "soft failure");
    assert_eq!(own_entries(&logger, LogSeverity::Warn).len(), 1);
    assert!(own_entries(&logger, LogSeverity::Error).is_empty());

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_engine_raise_keeps_variant() {
    let logger = MemoryLogger::new();
    Engine::set_logger(logger.clone());

    let err = crate::engine_raise!("galaxy3d::test", Error::capacity_exhausted("Sampler static heap", 1, 16, 16));
    assert!(matches!(err, Error::CapacityExhausted { capacity: 16, .. }));
    assert!(logger.contains("Sampler static heap"));

    Engine::reset_logger();
}
