//! Result pipeline
//!
//! Finished units flow through a chain of stages. Each stage sees every unit
//! once, in completion order, and gets a final `finish` call with the run
//! totals.

pub mod dryrun;
pub mod durations;
pub mod filters;
pub mod printer;
pub mod summary;

pub use dryrun::dry_run;
pub use durations::DurationSummary;
pub use filters::{FailFilter, TimeFilter};
pub use printer::ResultPrinter;
pub use summary::ResultSummary;

use colored::{ColoredString, Colorize};
use flotilla_core::{Status, TestUnit};
use std::io;
use std::time::Duration;

/// Facts about the whole run, known once it's over
#[derive(Debug, Clone, Default)]
pub struct RunInfo {
    pub elapsed: Duration,
    pub num_procs: usize,
    pub isolated: bool,
}

impl RunInfo {
    /// `1 process`, `4 processes (isolated)`, ...
    pub fn describe(&self) -> String {
        let procs = self.num_procs.max(1);
        let mut text = format!("{} process{}", procs, if procs == 1 { "" } else { "es" });
        if self.isolated {
            text.push_str(" (isolated)");
        }
        text
    }
}

/// One stage of the result pipeline
pub trait ResultStage {
    fn observe(&mut self, unit: &TestUnit) -> io::Result<()>;

    fn finish(&mut self, _run: &RunInfo) -> io::Result<()> {
        Ok(())
    }
}

/// Ordered chain of stages
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn ResultStage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: impl ResultStage + 'static) -> &mut Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn observe(&mut self, unit: &TestUnit) -> io::Result<()> {
        for stage in self.stages.iter_mut() {
            stage.observe(unit)?;
        }
        Ok(())
    }

    pub fn finish(&mut self, run: &RunInfo) -> io::Result<()> {
        for stage in self.stages.iter_mut() {
            stage.finish(run)?;
        }
        Ok(())
    }
}

/// Status label as printed, accounting for expected failures
pub(crate) fn status_label(unit: &TestUnit) -> &'static str {
    match unit.status() {
        Some(Status::Ok) if unit.expected_fail() => "expected FAIL",
        Some(status) => status.as_str(),
        None => "PENDING",
    }
}

/// Color `text` the way `unit`'s status is colored, if colors are on
pub(crate) fn paint(unit: &TestUnit, text: &str, color: bool) -> ColoredString {
    if !color {
        return text.normal().clear();
    }
    match unit.status() {
        Some(Status::Ok) if unit.expected_fail() => text.yellow(),
        Some(Status::Ok) => text.green(),
        Some(Status::Fail) => text.red().bold(),
        Some(Status::Skip) => text.cyan(),
        None => text.normal(),
    }
}

/// Name shown for a unit
pub(crate) fn display_name(unit: &TestUnit, full_path: bool) -> String {
    if full_path {
        unit.spec().to_string()
    } else {
        unit.short_name()
    }
}
