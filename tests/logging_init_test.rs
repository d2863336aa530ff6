//! Process-wide logging initialization.
//!
//! Lives in its own test binary: the global subscriber can be installed only
//! once per process.

use k2600_probecard::config::AppConfig;
use k2600_probecard::logging::{self, LoggingConfig};
use serial_test::serial;
use tracing::Level;

#[test]
#[serial]
fn test_init_writes_events_to_log_file_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("k2600.log");

    logging::init(
        LoggingConfig::new(Level::INFO)
            .with_ansi(false)
            .with_log_file(&path)
            .with_rotation(1024 * 1024, 2),
    )
    .unwrap();

    tracing::error!("Timeout expired before operation completed while reading *ESR?");

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("Timeout expired before operation completed while reading *ESR?"));
    assert!(!contents.contains("\u{1b}["));

    // A second installation is a no-op, not an error.
    assert!(logging::init(LoggingConfig::new(Level::DEBUG)).is_ok());
    assert!(logging::init_from_config(&AppConfig::default()).is_ok());
}
