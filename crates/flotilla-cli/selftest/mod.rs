//! Demonstration suite for `flotilla-selftest`
//!
//! Tests that crash, hang or fail on purpose only misbehave when
//! `FLOTILLA_SELFTEST_FAULTS` is set; otherwise the whole suite passes.

pub mod test_basics;
pub mod test_distributed;
pub mod test_faults;
pub mod test_fixtures;

use flotilla_core::Registry;
use std::fs::OpenOptions;
use std::io::Write;

/// Turns on the deliberate faults
pub const FAULTS_VAR: &str = "FLOTILLA_SELFTEST_FAULTS";

/// File that fixture hooks append their calls to
pub const LOG_VAR: &str = "FLOTILLA_SELFTEST_LOG";

pub fn registry() -> Registry {
    Registry::new()
        .with(test_basics::module())
        .with(test_distributed::module())
        .with(test_faults::module())
        .with(test_fixtures::module())
}

pub fn faults_enabled() -> bool {
    std::env::var_os(FAULTS_VAR).is_some_and(|v| !v.is_empty())
}

/// Append `event` and the process id to the fixture log, if one is configured
pub fn log_event(event: &str) {
    let Some(path) = std::env::var_os(LOG_VAR) else {
        return;
    };
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(file, "{} {}", event, std::process::id());
    }
}
