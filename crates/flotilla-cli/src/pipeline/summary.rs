//! End-of-run summary

use super::{display_name, ResultStage, RunInfo};
use colored::Colorize;
use flotilla_core::{Status, TestUnit};
use std::io::{self, Write};

/// Counts results and prints the skipped and failed lists at the end
pub struct ResultSummary<W: Write> {
    out: W,
    color: bool,
    full_path: bool,
    show_skipped: bool,
    passed: usize,
    expected_failures: usize,
    skipped: Vec<(String, String)>,
    failed: Vec<(String, String)>,
}

impl<W: Write> ResultSummary<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            color: true,
            full_path: false,
            show_skipped: false,
            passed: 0,
            expected_failures: 0,
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn with_full_path(mut self, full_path: bool) -> Self {
        self.full_path = full_path;
        self
    }

    pub fn with_show_skipped(mut self, show_skipped: bool) -> Self {
        self.show_skipped = show_skipped;
        self
    }

    pub fn total(&self) -> usize {
        self.passed + self.skipped.len() + self.failed.len()
    }

    pub fn failed(&self) -> usize {
        self.failed.len()
    }

    fn heading(&self, text: &str) -> String {
        if self.color {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }
}

impl<W: Write> ResultStage for ResultSummary<W> {
    fn observe(&mut self, unit: &TestUnit) -> io::Result<()> {
        let name = display_name(unit, self.full_path);
        match unit.status() {
            Some(Status::Ok) => {
                self.passed += 1;
                if unit.expected_fail() {
                    self.expected_failures += 1;
                }
            }
            Some(Status::Skip) => self.skipped.push((name, unit.err_msg().to_string())),
            Some(Status::Fail) | None => self.failed.push((name, unit.err_msg().to_string())),
        }
        Ok(())
    }

    fn finish(&mut self, run: &RunInfo) -> io::Result<()> {
        if self.show_skipped && !self.skipped.is_empty() {
            writeln!(self.out)?;
            writeln!(self.out, "{}", self.heading("Skipped tests:"))?;
            for (name, reason) in &self.skipped {
                match reason.lines().next() {
                    Some(first) => writeln!(self.out, "  {}: {}", name, first)?,
                    None => writeln!(self.out, "  {}", name)?,
                }
            }
        }

        if !self.failed.is_empty() {
            writeln!(self.out)?;
            writeln!(self.out, "{}", self.heading("Failed tests:"))?;
            for (name, error) in &self.failed {
                writeln!(self.out, "  {}", name)?;
                for line in error.lines() {
                    writeln!(self.out, "      {}", line)?;
                }
            }
        }

        writeln!(self.out)?;
        writeln!(self.out, "{}", "-".repeat(70))?;
        let mut counts = format!(
            "Ran {} test{}: {} passed, {} failed, {} skipped",
            self.total(),
            if self.total() == 1 { "" } else { "s" },
            self.passed,
            self.failed.len(),
            self.skipped.len()
        );
        if self.expected_failures > 0 {
            counts.push_str(&format!(" ({} expected failure{})", self.expected_failures, if self.expected_failures == 1 { "" } else { "s" }));
        }
        writeln!(self.out, "{}", counts)?;
        writeln!(
            self.out,
            "Wall clock: {:.3}s using {}",
            run.elapsed.as_secs_f64(),
            run.describe()
        )?;

        let verdict = if self.failed.is_empty() { "OK" } else { "FAILED" };
        let verdict = match (self.color, self.failed.is_empty()) {
            (false, _) => verdict.to_string(),
            (true, true) => verdict.green().bold().to_string(),
            (true, false) => verdict.red().bold().to_string(),
        };
        writeln!(self.out, "{}", verdict)?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{done, SharedBuf};
    use super::*;
    use std::time::Duration;

    fn summary(buf: &SharedBuf, show_skipped: bool) -> ResultSummary<SharedBuf> {
        ResultSummary::new(buf.clone())
            .with_color(false)
            .with_show_skipped(show_skipped)
    }

    #[test]
    fn test_counts_and_failures() {
        let buf = SharedBuf::default();
        let mut stage = summary(&buf, false);
        stage.observe(&done("m:test_a", Status::Ok, "")).unwrap();
        stage.observe(&done("m:test_b", Status::Fail, "boom")).unwrap();
        stage.observe(&done("m:test_c", Status::Skip, "later")).unwrap();
        stage
            .finish(&RunInfo {
                elapsed: Duration::from_millis(1500),
                num_procs: 2,
                isolated: false,
            })
            .unwrap();

        let text = buf.text();
        assert!(text.contains("Failed tests:\n  m:test_b\n      boom\n"));
        assert!(!text.contains("Skipped tests:"));
        assert!(text.contains("Ran 3 tests: 1 passed, 1 failed, 1 skipped"));
        assert!(text.contains("Wall clock: 1.500s using 2 processes"));
        assert!(text.trim_end().ends_with("FAILED"));
        assert_eq!(stage.failed(), 1);
    }

    #[test]
    fn test_skipped_list_on_request() {
        let buf = SharedBuf::default();
        let mut stage = summary(&buf, true);
        stage.observe(&done("m:test_c", Status::Skip, "needs network\nmore")).unwrap();
        stage.finish(&RunInfo::default()).unwrap();

        let text = buf.text();
        assert!(text.contains("Skipped tests:\n  m:test_c: needs network\n"));
        assert!(text.trim_end().ends_with("OK"));
    }
}
