//! The test run: configure, discover, execute, report

use crate::args::Args;
use crate::pipeline::{
    dry_run, DurationSummary, FailFilter, Pipeline, ResultPrinter, ResultSummary, RunInfo, TimeFilter,
};
use anyhow::{Context, Result};
use flotilla_config::{Config, ConfigLoader};
use flotilla_core::{
    strategy, Discoverer, ExecOptions, ModuleLoader, NameMatcher, Resolver, ResolverSettings, Task, UnitStream,
};
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// What a finished run reports back to `main`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub total: usize,
    pub unexpected_failures: usize,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.unexpected_failures == 0
    }
}

/// Run the tests named by `args` and report the results
pub fn run(args: &Args, loader: Arc<dyn ModuleLoader>) -> Result<RunOutcome> {
    let color = !args.no_color;
    if !color {
        colored::control::set_override(false);
    }

    let cwd = std::env::current_dir().context("can't determine the working directory")?;
    let config = load_config(args, &cwd)?;
    let resolver = Arc::new(Resolver::new(loader, resolver_settings(args, &config, &cwd))?);

    let skip = NameMatcher::new(&config.skip_dirs()).context("invalid skip_dirs entry")?;
    let module_pattern = args.module_pattern.as_deref().unwrap_or(config.module_pattern());
    let discoverer = Discoverer::new(Arc::clone(&resolver))?
        .skip_dirs(Arc::new(move |name| skip.matches(name)))
        .module_pattern(module_pattern)
        .with_context(|| format!("invalid module pattern '{}'", module_pattern))?;

    let starts = starting_points(args)?;
    let options = exec_options(args, &config);
    tracing::info!(
        starts = starts.len(),
        num_procs = options.num_procs,
        isolated = options.isolated,
        "starting test run"
    );

    let mut pipeline = build_pipeline(args, color)?;
    let run_info = RunInfo {
        elapsed: Duration::ZERO,
        num_procs: options.num_procs,
        isolated: options.isolated,
    };

    let started = Instant::now();
    let tasks = discoverer.discover(starts);
    let tasks: Box<dyn Iterator<Item = Task>> = if args.pre_announce {
        Box::new(tasks.inspect(announce))
    } else {
        Box::new(tasks)
    };
    let stream: UnitStream<'_> = if args.dryrun {
        Box::new(dry_run(tasks))
    } else {
        strategy::execute(tasks, resolver, options).context("can't start test execution")?
    };

    let mut outcome = RunOutcome::default();
    for unit in stream {
        outcome.total += 1;
        if unit.is_unexpected_failure() {
            outcome.unexpected_failures += 1;
        }
        pipeline.observe(&unit).context("can't write test results")?;
    }

    let run_info = RunInfo {
        elapsed: started.elapsed(),
        ..run_info
    };
    pipeline.finish(&run_info).context("can't write test summary")?;
    Ok(outcome)
}

fn load_config(args: &Args, cwd: &Path) -> Result<Config> {
    let mut loader = ConfigLoader::new();
    let config = match &args.config {
        Some(path) => loader.load_from_file(path),
        None => loader.load_from_directory(cwd),
    };
    config.context("can't load configuration")
}

fn resolver_settings(args: &Args, config: &Config, cwd: &Path) -> ResolverSettings {
    let mut search_path = vec![cwd.to_path_buf()];
    if let Some(root) = config.project_root() {
        if root != cwd {
            search_path.push(root.to_path_buf());
        }
    }
    let test_globs = if args.test_globs.is_empty() {
        config.test_globs()
    } else {
        args.test_globs.clone()
    };
    ResolverSettings {
        search_path,
        test_globs,
        ..Default::default()
    }
}

fn exec_options(args: &Args, config: &Config) -> ExecOptions {
    let num_procs = if args.pre_announce {
        1
    } else {
        args.num_procs
            .or(config.num_procs())
            .unwrap_or_else(default_num_procs)
            .max(1)
    };
    ExecOptions {
        num_procs,
        isolated: args.isolated,
        nocapture: args.nocapture,
        stop: args.stop,
        timeout: args.timeout.or(config.timeout()),
        nompi: args.nompi,
        rendezvous: None,
    }
}

/// One worker per available CPU
fn default_num_procs() -> usize {
    thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}

/// Positional starts plus the test file, or the working directory
fn starting_points(args: &Args) -> Result<Vec<String>> {
    let mut starts = args.starts.clone();
    if let Some(path) = &args.testfile {
        let text = fs::read_to_string(path).with_context(|| format!("can't read test file {}", path.display()))?;
        starts.extend(parse_test_list(&text));
    }
    if starts.is_empty() {
        starts.push(".".to_string());
    }
    Ok(starts)
}

/// One specifier per line; blank lines and `#` comments are ignored
pub fn parse_test_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn build_pipeline(args: &Args, color: bool) -> Result<Pipeline> {
    let mut pipeline = Pipeline::new();
    pipeline.push(
        ResultPrinter::new(io::stdout(), args.verbose)
            .with_compact(args.compact)
            .with_color(color)
            .with_full_path(args.full_path),
    );

    if let Some(count) = args.durations {
        let min = Duration::try_from_secs_f64(args.durations_min).unwrap_or_default();
        pipeline.push(DurationSummary::new(io::stdout(), count, min).with_full_path(args.full_path));
    }
    if let Some(maxtime) = args.maxtime {
        let maxtime = Duration::try_from_secs_f64(maxtime).context("--maxtime must be a non-negative number")?;
        pipeline.push(TimeFilter::new(crate::pipeline::filters::QUICK_TESTS_FILE, maxtime));
    }
    if args.save_fails {
        pipeline.push(FailFilter::new(crate::pipeline::filters::FAIL_TESTS_FILE));
    }

    pipeline.push(
        ResultSummary::new(io::stdout())
            .with_color(color)
            .with_full_path(args.full_path)
            .with_show_skipped(args.show_skipped),
    );

    if !args.noreport && !args.dryrun {
        let file = report_writer(&args.outfile)?;
        let shared = SharedFile(Rc::new(RefCell::new(file)));
        pipeline.push(ResultPrinter::new(shared.clone(), true).with_color(false).with_full_path(true));
        pipeline.push(
            ResultSummary::new(shared)
                .with_color(false)
                .with_full_path(true)
                .with_show_skipped(true),
        );
    }
    Ok(pipeline)
}

fn report_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("can't create report file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// The report file, written by both the verbose printer and the summary
#[derive(Clone)]
struct SharedFile(Rc<RefCell<BufWriter<File>>>);

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.borrow_mut().flush()
    }
}

fn announce(task: &Task) {
    let mut out = io::stdout().lock();
    for unit in task.units() {
        let _ = writeln!(out, "running {}", unit.spec());
    }
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_parse_test_list() {
        let text = "# quick tests\nm:test_a\n\n  m:G.test_b  \n#m:test_c\n";
        assert_eq!(parse_test_list(text), vec!["m:test_a", "m:G.test_b"]);
    }

    #[test]
    fn test_pre_announce_forces_one_process() {
        let args = Args::try_parse_from(["flotilla", "-n", "8", "--pre-announce"]).unwrap();
        assert_eq!(exec_options(&args, &Config::default()).num_procs, 1);

        let args = Args::try_parse_from(["flotilla", "-n", "8"]).unwrap();
        assert_eq!(exec_options(&args, &Config::default()).num_procs, 8);
    }

    #[test]
    fn test_num_procs_defaults_to_cpu_count() {
        let args = Args::try_parse_from(["flotilla"]).unwrap();
        let options = exec_options(&args, &Config::default());
        assert_eq!(options.num_procs, default_num_procs());
        assert!(options.num_procs >= 1);
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        config.settings.num_procs = Some(3);
        config.settings.timeout = Some(9.0);

        let args = Args::try_parse_from(["flotilla", "--timeout", "2.5"]).unwrap();
        let options = exec_options(&args, &config);
        assert_eq!(options.num_procs, 3);
        assert_eq!(options.timeout, Some(2.5));
    }

    #[test]
    fn test_default_start_is_cwd() {
        let args = Args::try_parse_from(["flotilla"]).unwrap();
        assert_eq!(starting_points(&args).unwrap(), vec!["."]);
    }

    #[test]
    fn test_command_line_globs_win() {
        let args = Args::try_parse_from(["flotilla", "-g", "check_*"]).unwrap();
        let settings = resolver_settings(&args, &Config::default(), Path::new("/work"));
        assert_eq!(settings.test_globs, vec!["check_*"]);
        assert_eq!(settings.search_path, vec![PathBuf::from("/work")]);
    }
}
