//! Per-process instrumentation hooks
//!
//! An executor starts its instrumentation before every unit, stops it after,
//! and saves it once when the process has finished all of its work. This is
//! the seam for coverage and profiling collectors.

/// Collector driven by the executor
pub trait Instrumentation: Send {
    fn start(&mut self) {}

    fn stop(&mut self) {}

    /// Persist collected data; called once per process
    fn save(&mut self) {}
}

/// Does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInstrumentation;

impl Instrumentation for NoInstrumentation {}

/// Counts start/stop/save calls; handy for checking executor wiring
#[derive(Debug, Default, Clone)]
pub struct CallCounter {
    counts: std::sync::Arc<parking_lot::Mutex<[usize; 3]>>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `[starts, stops, saves]`
    pub fn counts(&self) -> [usize; 3] {
        *self.counts.lock()
    }
}

impl Instrumentation for CallCounter {
    fn start(&mut self) {
        self.counts.lock()[0] += 1;
    }

    fn stop(&mut self) {
        self.counts.lock()[1] += 1;
    }

    fn save(&mut self) {
        self.counts.lock()[2] += 1;
    }
}
