//! Stages that write specifier lists for later runs
//!
//! Both files can be fed back with `--testfile`.

use super::{ResultStage, RunInfo};
use flotilla_core::{Status, TestUnit};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const QUICK_TESTS_FILE: &str = "quicktests.in";
pub const FAIL_TESTS_FILE: &str = "failtests.in";

/// Collects passing tests that finished within a time limit
pub struct TimeFilter {
    path: PathBuf,
    maxtime: Duration,
    specs: Vec<String>,
}

impl TimeFilter {
    pub fn new(path: impl Into<PathBuf>, maxtime: Duration) -> Self {
        Self {
            path: path.into(),
            maxtime,
            specs: Vec::new(),
        }
    }
}

impl ResultStage for TimeFilter {
    fn observe(&mut self, unit: &TestUnit) -> io::Result<()> {
        if unit.status() == Some(Status::Ok) && unit.elapsed() <= self.maxtime {
            self.specs.push(unit.spec().to_string());
        }
        Ok(())
    }

    fn finish(&mut self, _run: &RunInfo) -> io::Result<()> {
        write_specs(&self.path, &mut self.specs)
    }
}

/// Collects tests that failed unexpectedly
pub struct FailFilter {
    path: PathBuf,
    specs: Vec<String>,
}

impl FailFilter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            specs: Vec::new(),
        }
    }
}

impl ResultStage for FailFilter {
    fn observe(&mut self, unit: &TestUnit) -> io::Result<()> {
        if unit.is_unexpected_failure() {
            self.specs.push(unit.spec().to_string());
        }
        Ok(())
    }

    fn finish(&mut self, _run: &RunInfo) -> io::Result<()> {
        write_specs(&self.path, &mut self.specs)
    }
}

fn write_specs(path: &Path, specs: &mut [String]) -> io::Result<()> {
    specs.sort();
    let mut text = specs.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    fs::write(path, text)?;
    tracing::info!(path = %path.display(), count = specs.len(), "wrote test list");
    Ok(())
}
