//! Command-line arguments

use clap::Parser;
use std::path::PathBuf;

/// Default report file
pub const DEFAULT_REPORT_FILE: &str = "test_report.out";

/// Run the tests compiled into this harness.
///
/// Starting points may be directories, module source files, dotted module
/// names or specifiers of the form `module[:group[.member]]`.
///
/// EXAMPLES:
///     flotilla-selftest                          Run everything under the current directory
///     flotilla-selftest selftest -n 4            Run a directory on 4 worker processes
///     flotilla-selftest selftest.test_basics:Arithmetic.test_add
///     flotilla-selftest -i --timeout 30 tests    Run each test in its own process
///
/// ENVIRONMENT VARIABLES:
///     FLOTILLA_LOG        Log filter (default: warn)
///     FLOTILLA_NUM_PROCS  Worker count override
///     NO_COLOR            Disable colored output
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Args {
    /// Directories, module files, module names or test specifiers
    pub starts: Vec<String>,

    /// Number of worker processes (default: one per CPU)
    #[arg(long = "numprocs", short = 'n', value_name = "N")]
    pub num_procs: Option<usize>,

    /// Run every test in its own subprocess
    #[arg(long, short = 'i')]
    pub isolated: bool,

    /// Stop after the first unexpected failure
    #[arg(long, short = 'x')]
    pub stop: bool,

    /// Don't capture test output
    #[arg(long, short = 's')]
    pub nocapture: bool,

    /// One line per test, and info-level logging
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Leave error text out of verbose lines
    #[arg(long)]
    pub compact: bool,

    /// Report file
    #[arg(long, short = 'o', default_value = DEFAULT_REPORT_FILE, value_name = "FILE")]
    pub outfile: PathBuf,

    /// Don't write a report file
    #[arg(long)]
    pub noreport: bool,

    /// List the tests that would run without running them
    #[arg(long)]
    pub dryrun: bool,

    /// Per-test timeout in seconds for isolated and distributed tests
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Run multi-process groups in-process as a single rank
    #[arg(long)]
    pub nompi: bool,

    /// Test member name glob (repeatable)
    #[arg(long = "test-glob", short = 'g', value_name = "GLOB")]
    pub test_globs: Vec<String>,

    /// File name glob for test modules found in directories
    #[arg(long, value_name = "GLOB")]
    pub module_pattern: Option<String>,

    /// Project config file to use instead of searching for flotilla.toml
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// File listing specifiers to run, one per line
    #[arg(long, short = 't', value_name = "FILE")]
    pub testfile: Option<PathBuf>,

    /// Write passing tests faster than SECS to quicktests.in
    #[arg(long, value_name = "SECS")]
    pub maxtime: Option<f64>,

    /// Write unexpected failures to failtests.in
    #[arg(long)]
    pub save_fails: bool,

    /// List skipped tests in the summary
    #[arg(long)]
    pub show_skipped: bool,

    /// Show the N slowest tests
    #[arg(long, value_name = "N")]
    pub durations: Option<usize>,

    /// Leave tests faster than SECS out of the durations list
    #[arg(long, default_value_t = 0.005, value_name = "SECS")]
    pub durations_min: f64,

    /// Show full specifiers instead of file names in the summary
    #[arg(long)]
    pub full_path: bool,

    /// Print each test's name before it runs (forces one process)
    #[arg(long)]
    pub pre_announce: bool,

    /// Disable colored output
    #[arg(long, env = "NO_COLOR", value_parser = clap::builder::BoolishValueParser::new())]
    pub no_color: bool,
}
