//! Per-test progress output

use super::{display_name, paint, status_label, ResultStage, RunInfo};
use flotilla_core::{RunKind, Status, TestUnit};
use std::io::{self, Write};

/// Prints a dot per test, or a line per test in verbose mode
pub struct ResultPrinter<W: Write> {
    out: W,
    verbose: bool,
    compact: bool,
    color: bool,
    full_path: bool,
    printed: usize,
}

impl<W: Write> ResultPrinter<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        Self {
            out,
            verbose,
            compact: false,
            color: true,
            full_path: false,
            printed: 0,
        }
    }

    /// Leave error text out of verbose lines
    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn with_full_path(mut self, full_path: bool) -> Self {
        self.full_path = full_path;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn print_line(&mut self, unit: &TestUnit) -> io::Result<()> {
        let tag = match unit.run_kind() {
            RunKind::InProcess => "",
            RunKind::Isolated => " (isolated)",
            RunKind::Distributed => " (distributed)",
        };
        let label = paint(unit, status_label(unit), self.color);
        writeln!(
            self.out,
            "{}{} ... {} ({:.3}s)",
            display_name(unit, self.full_path),
            tag,
            label,
            unit.elapsed().as_secs_f64()
        )?;

        let show_error = unit.is_unexpected_failure() || (!self.compact && !unit.err_msg().is_empty());
        if show_error && !unit.err_msg().is_empty() {
            for line in unit.err_msg().lines() {
                writeln!(self.out, "    {}", line)?;
            }
        }
        Ok(())
    }

    fn print_dot(&mut self, unit: &TestUnit) -> io::Result<()> {
        let mark = match unit.status() {
            Some(Status::Ok) if unit.expected_fail() => "x",
            Some(Status::Ok) => ".",
            Some(Status::Skip) => "s",
            Some(Status::Fail) => "F",
            None => "?",
        };
        write!(self.out, "{}", paint(unit, mark, self.color))?;
        self.printed += 1;
        if self.printed % 72 == 0 {
            writeln!(self.out)?;
        }
        self.out.flush()
    }
}

impl<W: Write> ResultStage for ResultPrinter<W> {
    fn observe(&mut self, unit: &TestUnit) -> io::Result<()> {
        if self.verbose {
            self.print_line(unit)
        } else {
            self.print_dot(unit)
        }
    }

    fn finish(&mut self, _run: &RunInfo) -> io::Result<()> {
        if !self.verbose && self.printed % 72 != 0 {
            writeln!(self.out)?;
        }
        self.out.flush()
    }
}
