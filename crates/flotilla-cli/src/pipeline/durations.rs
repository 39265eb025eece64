//! Slowest-tests report

use super::{display_name, ResultStage, RunInfo};
use flotilla_core::TestUnit;
use std::io::{self, Write};
use std::time::Duration;

pub struct DurationSummary<W: Write> {
    out: W,
    count: usize,
    min: Duration,
    full_path: bool,
    timings: Vec<(Duration, String)>,
}

impl<W: Write> DurationSummary<W> {
    /// Report the `count` slowest tests that took at least `min`
    pub fn new(out: W, count: usize, min: Duration) -> Self {
        Self {
            out,
            count,
            min,
            full_path: false,
            timings: Vec::new(),
        }
    }

    pub fn with_full_path(mut self, full_path: bool) -> Self {
        self.full_path = full_path;
        self
    }
}

impl<W: Write> ResultStage for DurationSummary<W> {
    fn observe(&mut self, unit: &TestUnit) -> io::Result<()> {
        let elapsed = unit.elapsed();
        if elapsed >= self.min {
            self.timings.push((elapsed, display_name(unit, self.full_path)));
        }
        Ok(())
    }

    fn finish(&mut self, _run: &RunInfo) -> io::Result<()> {
        if self.count == 0 {
            return Ok(());
        }
        self.timings.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        writeln!(self.out)?;
        writeln!(self.out, "Slowest {} durations:", self.count)?;
        if self.timings.is_empty() {
            writeln!(self.out, "  (no tests over {:.3}s)", self.min.as_secs_f64())?;
        }
        for (elapsed, name) in self.timings.iter().take(self.count) {
            writeln!(self.out, "  {:>9.3}s  {}", elapsed.as_secs_f64(), name)?;
        }
        self.out.flush()
    }
}
