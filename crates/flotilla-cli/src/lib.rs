//! Flotilla command-line surface
//!
//! A harness binary registers its tests and hands the registry to [`run`]:
//!
//! ```no_run
//! use flotilla_core::{Module, Registry};
//! use std::process::ExitCode;
//!
//! fn main() -> ExitCode {
//!     let registry = Registry::new().with(Module::new("tests.test_math").test("test_add", |_| Ok(())));
//!     flotilla_cli::run(registry)
//! }
//! ```
//!
//! The same binary serves as worker, isolated child and rank process; `run`
//! takes care of that before it looks at the command line.

pub mod args;
pub mod commands;
pub mod logging;
pub mod pipeline;

pub use args::Args;
pub use commands::RunOutcome;

use clap::Parser;
use colored::Colorize;
use flotilla_core::{child, ModuleLoader, Registry};
use std::ffi::OsString;
use std::process::ExitCode;
use std::sync::Arc;

/// Exit code when any test failed unexpectedly
pub const EXIT_FAILED: u8 = 1;

/// Exit code for usage and harness errors
pub const EXIT_ERROR: u8 = 2;

/// Entry point of a harness binary
pub fn run(registry: Registry) -> ExitCode {
    run_with_args(registry, std::env::args_os())
}

/// [`run`] with an explicit command line
pub fn run_with_args<I, T>(registry: Registry, args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let loader: Arc<dyn ModuleLoader> = Arc::new(registry);

    if child::current_role().is_some() {
        logging::init(false);
        if let Some(code) = child::run_child_role(Arc::clone(&loader)) {
            return code;
        }
    }

    let args = match Args::try_parse_from(args) {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_ERROR)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    logging::init(args.verbose);

    match commands::run::run(&args, loader) {
        Ok(outcome) if outcome.success() => ExitCode::SUCCESS,
        Ok(outcome) => {
            tracing::info!(failures = outcome.unexpected_failures, "test run failed");
            ExitCode::from(EXIT_FAILED)
        }
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
