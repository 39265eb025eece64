//! Test units and tasks
//!
//! A [`TestUnit`] is one runnable test plus, once run, its result. Units are
//! plain data: they cross process boundaries as JSON, and the parent adopts
//! whatever the child produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Final status of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Fail,
    Skip,
}

impl Status {
    /// Exit code an isolated or distributed child uses to report this status
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Skip => 42,
            Status::Fail => 43,
        }
    }

    pub fn from_exit_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Status::Ok),
            42 => Some(Status::Skip),
            43 => Some(Status::Fail),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Fail => "FAIL",
            Status::Skip => "SKIP",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which shared fixtures a unit is responsible for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureMarks {
    pub first_in_module: bool,
    pub last_in_module: bool,
    pub first_in_group: bool,
    pub last_in_group: bool,
}

impl FixtureMarks {
    /// A unit that runs every enclosing fixture itself
    pub fn all() -> Self {
        Self {
            first_in_module: true,
            last_in_module: true,
            first_in_group: true,
            last_in_group: true,
        }
    }
}

/// How a unit was executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    #[default]
    InProcess,
    Isolated,
    Distributed,
}

/// One runnable test and its result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestUnit {
    spec: String,
    module: Option<String>,
    group: Option<String>,
    member: Option<String>,
    test_dir: Option<PathBuf>,

    status: Option<Status>,
    err_msg: String,
    output: String,

    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    memory_usage: f64,
    load: [f64; 3],

    expected_fail: bool,
    nprocs: usize,
    isolated: bool,
    nocapture: bool,
    run_kind: RunKind,
    marks: FixtureMarks,
}

impl TestUnit {
    /// A pending unit for `spec` that runs all of its own fixtures
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into().trim().to_string(),
            module: None,
            group: None,
            member: None,
            test_dir: None,
            status: None,
            err_msg: String::new(),
            output: String::new(),
            start_time: None,
            end_time: None,
            memory_usage: 0.0,
            load: [0.0; 3],
            expected_fail: false,
            nprocs: 0,
            isolated: false,
            nocapture: false,
            run_kind: RunKind::InProcess,
            marks: FixtureMarks::all(),
        }
    }

    /// A unit that failed before it could run (resolution error, crash)
    pub fn failed(spec: impl Into<String>, err_msg: impl Into<String>) -> Self {
        Self::with_outcome(spec, Status::Fail, err_msg)
    }

    /// A unit with a known outcome and no timing of its own
    pub fn with_outcome(spec: impl Into<String>, status: Status, err_msg: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut unit = Self::new(spec);
        unit.status = Some(status);
        unit.err_msg = err_msg.into();
        unit.start_time = Some(now);
        unit.end_time = Some(now);
        unit
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn member(&self) -> Option<&str> {
        self.member.as_deref()
    }

    pub fn test_dir(&self) -> Option<&Path> {
        self.test_dir.as_deref()
    }

    /// `None` until the unit has run
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub fn is_done(&self) -> bool {
        self.status.is_some()
    }

    pub fn err_msg(&self) -> &str {
        &self.err_msg
    }

    /// Captured standard output
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Wall-clock run time; zero when the unit never ran
    pub fn elapsed(&self) -> Duration {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    /// Peak resident memory of the running process, in MB
    pub fn memory_usage(&self) -> f64 {
        self.memory_usage
    }

    /// 1, 5 and 15 minute load averages at completion
    pub fn load(&self) -> [f64; 3] {
        self.load
    }

    pub fn expected_fail(&self) -> bool {
        self.expected_fail
    }

    pub fn nprocs(&self) -> usize {
        self.nprocs
    }

    pub fn isolated(&self) -> bool {
        self.isolated
    }

    pub fn nocapture(&self) -> bool {
        self.nocapture
    }

    pub fn run_kind(&self) -> RunKind {
        self.run_kind
    }

    pub fn marks(&self) -> FixtureMarks {
        self.marks
    }

    /// A failure that counts against the run
    pub fn is_unexpected_failure(&self) -> bool {
        self.status == Some(Status::Fail) && !self.expected_fail
    }

    /// Identity used for de-duplication: `module:group.member`
    pub fn key(&self) -> String {
        match (&self.module, &self.member) {
            (Some(module), Some(member)) => {
                crate::specifier::join(module, self.group.as_deref(), member)
            }
            _ => self.spec.clone(),
        }
    }

    /// `file_name:rest` for path specifiers, the spec itself otherwise
    pub fn short_name(&self) -> String {
        match self.spec.rsplit_once(':') {
            Some((module, rest)) if module.contains('/') || module.contains('\\') => {
                let base = Path::new(module)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| module.to_string());
                format!("{}:{}", base, rest)
            }
            _ => self.spec.clone(),
        }
    }

    pub(crate) fn set_identity(
        &mut self,
        module: &str,
        group: Option<&str>,
        member: &str,
        test_dir: Option<PathBuf>,
    ) {
        self.module = Some(module.to_string());
        self.group = group.map(str::to_string);
        self.member = Some(member.to_string());
        self.test_dir = test_dir;
    }

    pub(crate) fn set_attributes(&mut self, nprocs: usize, isolated: bool) {
        self.nprocs = nprocs;
        self.isolated = isolated;
    }

    pub(crate) fn set_nocapture(&mut self, nocapture: bool) {
        self.nocapture = nocapture;
    }

    pub(crate) fn set_run_kind(&mut self, kind: RunKind) {
        self.run_kind = kind;
    }

    pub(crate) fn marks_mut(&mut self) -> &mut FixtureMarks {
        &mut self.marks
    }

    pub(crate) fn begin(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        self.start_time = Some(now);
        now
    }

    /// Record the outcome; a unit's status is only ever set once
    pub(crate) fn conclude(&mut self, status: Status, err_msg: String, output: String) {
        debug_assert!(self.status.is_none(), "status of {} set twice", self.spec);
        if self.start_time.is_none() {
            self.start_time = Some(Utc::now());
        }
        self.status = Some(status);
        self.err_msg = err_msg;
        self.output = output;
        self.end_time = Some(Utc::now());
    }

    /// Fail a pending unit, keeping its identity and start time
    pub(crate) fn conclude_failed(&mut self, err_msg: impl Into<String>) {
        self.conclude(Status::Fail, err_msg.into(), String::new());
    }

    pub(crate) fn set_expected_fail(&mut self, expected: bool) {
        self.expected_fail = expected;
    }

    pub(crate) fn set_telemetry(&mut self, memory_usage: f64, load: [f64; 3]) {
        self.memory_usage = memory_usage;
        self.load = load;
    }

    pub(crate) fn add_memory_usage(&mut self, mb: f64) {
        self.memory_usage += mb;
    }

    /// Replace status and message after a reduction across ranks
    pub(crate) fn override_status(&mut self, status: Status, err_msg: String) {
        self.status = Some(status);
        self.err_msg = err_msg;
    }
}

impl fmt::Display for TestUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{}: {}", self.spec, status)?,
            None => write!(f, "{}: PENDING", self.spec)?,
        }
        if !self.err_msg.is_empty() {
            write!(f, "\n{}", self.err_msg)?;
        }
        Ok(())
    }
}

/// Unit of scheduling
///
/// A group task runs on one worker, in order, because its units share
/// module or group fixtures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Task {
    Single(TestUnit),
    Group(Vec<TestUnit>),
}

impl Task {
    pub fn units(&self) -> &[TestUnit] {
        match self {
            Task::Single(unit) => std::slice::from_ref(unit),
            Task::Group(units) => units,
        }
    }

    pub fn into_units(self) -> Vec<TestUnit> {
        match self {
            Task::Single(unit) => vec![unit],
            Task::Group(units) => units,
        }
    }

    pub fn len(&self) -> usize {
        self.units().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units().is_empty()
    }
}

impl From<TestUnit> for Task {
    fn from(unit: TestUnit) -> Self {
        Task::Single(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(Status::Ok, 0)]
    #[case(Status::Skip, 42)]
    #[case(Status::Fail, 43)]
    fn test_exit_codes(#[case] status: Status, #[case] code: i32) {
        assert_eq!(status.exit_code(), code);
        assert_eq!(Status::from_exit_code(code), Some(status));
    }

    #[test]
    fn test_unknown_exit_code() {
        assert_eq!(Status::from_exit_code(1), None);
        assert_eq!(Status::from_exit_code(-6), None);
    }

    #[test]
    fn test_failed_unit() {
        let unit = TestUnit::failed("  m:t ", "boom");
        assert_eq!(unit.spec(), "m:t");
        assert_eq!(unit.status(), Some(Status::Fail));
        assert!(unit.is_unexpected_failure());
        assert_eq!(unit.elapsed(), Duration::ZERO);
        assert_eq!(unit.to_string(), "m:t: FAIL\nboom");
    }

    #[test]
    fn test_expected_failure_does_not_count() {
        let mut unit = TestUnit::new("m:t");
        unit.conclude(Status::Fail, String::new(), String::new());
        unit.set_expected_fail(true);
        assert!(!unit.is_unexpected_failure());
    }

    #[test]
    fn test_key_and_short_name() {
        let mut unit = TestUnit::new("/src/tests/test_a.rs:G.test_x");
        unit.set_identity("tests.test_a", Some("G"), "test_x", None);
        assert_eq!(unit.key(), "tests.test_a:G.test_x");
        assert_eq!(unit.short_name(), "test_a.rs:G.test_x");

        let unit = TestUnit::new("tests.test_a:test_y");
        assert_eq!(unit.key(), "tests.test_a:test_y");
        assert_eq!(unit.short_name(), "tests.test_a:test_y");
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&Status::Skip).unwrap();
        assert_eq!(json, "\"SKIP\"");

        let unit = TestUnit::with_outcome("m:t", Status::Ok, "");
        let back: TestUnit = serde_json::from_str(&serde_json::to_string(&unit).unwrap()).unwrap();
        assert_eq!(back, unit);
    }

    #[test]
    fn test_task_units() {
        let task = Task::Group(vec![TestUnit::new("m:a"), TestUnit::new("m:b")]);
        assert_eq!(task.len(), 2);
        let single: Task = TestUnit::new("m:c").into();
        assert_eq!(single.units()[0].spec(), "m:c");
        assert_eq!(single.into_units().len(), 1);
    }
}
